use crate::util::time_diff_ms;
use std::time::SystemTime;

/// How a paste event relates to the monitored editor surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteClass {
    /// Target was outside the editor boundary; irrelevant to the exam.
    Ignored,
    /// Preceded by a fresh internal copy/cut; the paste may proceed.
    Internal,
    /// No matching internal copy; the caller must block the paste.
    External,
}

/// Classifies pastes as internal or external based on a short-lived arm set
/// by copy/cut events inside the editor boundary. The TTL keeps a copy made
/// minutes earlier from whitelisting later unrelated pastes.
#[derive(Debug)]
pub struct ClipboardGuard {
    armed_at: Option<SystemTime>,
    ttl_ms: u64,
    external_paste_count: u32,
}

impl ClipboardGuard {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            armed_at: None,
            ttl_ms,
            external_paste_count: 0,
        }
    }

    /// Called on a `copy` or `cut` originating inside the editor boundary.
    pub fn arm_internal_copy(&mut self, now: SystemTime) {
        self.armed_at = Some(now);
    }

    /// Classify a paste captured at the outermost listening scope. The
    /// containment check is supplied by the editor collaborator; a paste
    /// targeting anything else is ignored. An internal arm is consumed by
    /// the first paste it admits.
    pub fn classify_paste(&mut self, within_editor: bool, now: SystemTime) -> PasteClass {
        if !within_editor {
            return PasteClass::Ignored;
        }
        if let Some(armed) = self.armed_at {
            if time_diff_ms(armed, now) <= self.ttl_ms {
                self.armed_at = None;
                return PasteClass::Internal;
            }
            // expired arm is as good as no arm
            self.armed_at = None;
        }
        self.external_paste_count += 1;
        PasteClass::External
    }

    pub fn external_paste_count(&self) -> u32 {
        self.external_paste_count
    }

    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    pub fn reset(&mut self) {
        self.armed_at = None;
        self.external_paste_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(ms: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_millis(ms)
    }

    fn guard() -> ClipboardGuard {
        ClipboardGuard::new(800)
    }

    #[test]
    fn paste_outside_editor_is_ignored() {
        let mut g = guard();
        assert_eq!(g.classify_paste(false, at(0)), PasteClass::Ignored);
        assert_eq!(g.external_paste_count(), 0);
    }

    #[test]
    fn paste_after_internal_copy_is_internal() {
        let mut g = guard();
        g.arm_internal_copy(at(0));
        assert_eq!(g.classify_paste(true, at(500)), PasteClass::Internal);
        assert_eq!(g.external_paste_count(), 0);
    }

    #[test]
    fn arm_is_consumed_by_first_paste() {
        let mut g = guard();
        g.arm_internal_copy(at(0));
        assert_eq!(g.classify_paste(true, at(100)), PasteClass::Internal);
        // the same copy does not whitelist a second paste
        assert_eq!(g.classify_paste(true, at(200)), PasteClass::External);
        assert_eq!(g.external_paste_count(), 1);
    }

    #[test]
    fn expired_arm_classifies_as_external() {
        let mut g = guard();
        g.arm_internal_copy(at(0));
        assert_eq!(g.classify_paste(true, at(801)), PasteClass::External);
        assert_eq!(g.external_paste_count(), 1);
    }

    #[test]
    fn arm_at_exact_ttl_boundary_is_still_fresh() {
        let mut g = guard();
        g.arm_internal_copy(at(0));
        assert_eq!(g.classify_paste(true, at(800)), PasteClass::Internal);
    }

    #[test]
    fn paste_with_no_copy_at_all_is_external() {
        let mut g = guard();
        assert_eq!(g.classify_paste(true, at(0)), PasteClass::External);
        assert_eq!(g.classify_paste(true, at(10)), PasteClass::External);
        assert_eq!(g.external_paste_count(), 2);
    }

    #[test]
    fn rearming_refreshes_the_window() {
        let mut g = guard();
        g.arm_internal_copy(at(0));
        g.arm_internal_copy(at(700));
        assert_eq!(g.classify_paste(true, at(1400)), PasteClass::Internal);
    }

    #[test]
    fn ignored_paste_does_not_consume_the_arm() {
        let mut g = guard();
        g.arm_internal_copy(at(0));
        assert_eq!(g.classify_paste(false, at(100)), PasteClass::Ignored);
        assert!(g.is_armed());
        assert_eq!(g.classify_paste(true, at(200)), PasteClass::Internal);
    }

    #[test]
    fn reset_clears_arm_and_counter() {
        let mut g = guard();
        g.arm_internal_copy(at(0));
        g.classify_paste(true, at(2000));
        assert_eq!(g.external_paste_count(), 1);
        g.reset();
        assert_eq!(g.external_paste_count(), 0);
        assert!(!g.is_armed());
    }
}
