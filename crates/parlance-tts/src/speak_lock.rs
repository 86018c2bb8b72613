use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parlance_foundation::TtsError;

/// Guards the invariant that at most one synthesis task is speaking for a
/// session at any instant.
///
/// The turn engine acquires a permit before opening a TTS session and holds
/// it until the stream ends or is torn down; a second acquisition while one
/// is live is a scheduling bug and surfaces as an error rather than double
/// audio.
#[derive(Clone, Default)]
pub struct SpeakLock {
    held: Arc<AtomicBool>,
}

impl SpeakLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> Result<SpeakPermit, TtsError> {
        if self.held.swap(true, Ordering::AcqRel) {
            return Err(TtsError::SpeakLockHeld);
        }
        Ok(SpeakPermit {
            held: self.held.clone(),
        })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

pub struct SpeakPermit {
    held: Arc<AtomicBool>,
}

impl Drop for SpeakPermit {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let lock = SpeakLock::new();
        let permit = lock.acquire().unwrap();
        assert!(lock.is_held());
        assert!(matches!(lock.acquire(), Err(TtsError::SpeakLockHeld)));
        drop(permit);
        assert!(!lock.is_held());
        assert!(lock.acquire().is_ok());
    }
}
