//! Post creation lifecycle.

use std::fmt;

/// Where one authoring attempt currently stands.
///
/// `Pending -> [MediaUploading -> MediaUploaded ->] Submitting -> Committed`,
/// with `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreateState {
    Pending,
    MediaUploading,
    MediaUploaded,
    Submitting,
    Committed,
    Failed,
}

impl CreateState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::MediaUploading => "media_uploading",
            Self::MediaUploaded => "media_uploaded",
            Self::Submitting => "submitting",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }

    /// Whether `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::MediaUploading | Self::Submitting)
                | (Self::MediaUploading, Self::MediaUploaded)
                | (Self::MediaUploaded, Self::Submitting)
                | (Self::Submitting, Self::Committed)
                | (
                    Self::Pending | Self::MediaUploading | Self::MediaUploaded | Self::Submitting,
                    Self::Failed
                )
        )
    }
}

impl fmt::Display for CreateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
