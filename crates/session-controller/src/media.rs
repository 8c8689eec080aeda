//! Capture device acquisition seam.
//!
//! The toolkit consumes a media handle but does not implement transport
//! itself; a [`MediaSourceProvider`] is injected at startup so deployments
//! can plug in a real capture backend and tests can substitute fakes. When
//! no backend is attached, recording degrades gracefully (`start` fails with
//! `CaptureUnavailable`) while the rest of the toolkit keeps working.

use collab_engines::recording::MediaSource;
use collab_engines::EngineError;

/// Creates capture sources for recording sessions.
pub trait MediaSourceProvider: Send + Sync {
    /// Create a new, unopened capture source.
    fn create_source(&self) -> Box<dyn MediaSource>;
}

/// Provider for deployments without a capture backend: every acquisition
/// fails with `CaptureUnavailable`.
#[derive(Debug, Default)]
pub struct NullCaptureProvider;

impl MediaSourceProvider for NullCaptureProvider {
    fn create_source(&self) -> Box<dyn MediaSource> {
        Box::new(NullCaptureSource)
    }
}

struct NullCaptureSource;

impl MediaSource for NullCaptureSource {
    fn open(&mut self) -> Result<(), EngineError> {
        Err(EngineError::CaptureUnavailable(
            "No capture backend attached".to_string(),
        ))
    }

    fn close(&mut self) {}

    fn content_type(&self) -> &str {
        "application/octet-stream"
    }

    fn file_extension(&self) -> &str {
        "bin"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_null_provider_never_acquires() {
        let provider = NullCaptureProvider;
        let mut source = provider.create_source();
        assert!(matches!(
            source.open(),
            Err(EngineError::CaptureUnavailable(_))
        ));
    }
}
