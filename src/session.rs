//! Mutable state for one greet→fetch→dispatch→close run.

use crate::perception::FaceFix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CubeAvailability {
    #[default]
    Unknown,
    Located,
    /// The search already failed this session; it is not repeated.
    Missing,
}

/// Owned by the runner and passed by reference into each dispatch step.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub user: Option<FaceFix>,
    pub cubes: CubeAvailability,
    pub remaining_medicine: u32,
    stock_alert_sent: bool,
}

impl SessionState {
    pub fn new(medicine_stock: u32) -> Self {
        Self {
            user: None,
            cubes: CubeAvailability::Unknown,
            remaining_medicine: medicine_stock,
            stock_alert_sent: false,
        }
    }

    /// Counts one medicine hand-over. Returns `true` exactly once: when the supply runs out.
    pub fn record_medicine_delivery(&mut self) -> bool {
        self.remaining_medicine = self.remaining_medicine.saturating_sub(1);
        if self.remaining_medicine < 1 && !self.stock_alert_sent {
            self.stock_alert_sent = true;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_fires_on_the_delivery_that_empties_stock() {
        let mut session = SessionState::new(3);

        assert!(!session.record_medicine_delivery());
        assert!(!session.record_medicine_delivery());
        assert!(session.record_medicine_delivery());
        assert_eq!(session.remaining_medicine, 0);

        // Already reported; further deliveries stay quiet.
        assert!(!session.record_medicine_delivery());
        assert_eq!(session.remaining_medicine, 0);
    }

    #[test]
    fn empty_stock_alerts_once() {
        let mut session = SessionState::new(0);
        assert!(session.record_medicine_delivery());
        assert!(!session.record_medicine_delivery());
    }

    #[test]
    fn fresh_sessions_know_nothing() {
        let session = SessionState::new(5);
        assert!(session.user.is_none());
        assert_eq!(session.cubes, CubeAvailability::Unknown);
    }
}
