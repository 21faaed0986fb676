//! Per-axis cached state.
//!
//! Purely in-memory; the controller updates it after an operation succeeded and never
//! on failure. Positions are optimistic after a move (set to the commanded target) and
//! authoritative after a query.

use stage_core::{LoopMode, SpeedProfile, Unit};

/// Cached state of one axis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AxisState {
    /// Last known position, `None` until the first move, home or query.
    pub position: Option<i64>,
    /// Last speed profile written or read back.
    pub speed: Option<SpeedProfile>,
    /// Last loop mode written or read back.
    pub loop_mode: Option<LoopMode>,
    /// Unit designated for positions of this axis.
    pub unit: Unit,
}

/// Cached state of every axis of one controller.
#[derive(Debug, Clone)]
pub struct AxisTracker {
    axes: Vec<AxisState>,
}

impl AxisTracker {
    /// Tracker for `axis_count` axes, all in `unit` with unknown position.
    pub fn new(axis_count: u8, unit: Unit) -> Self {
        let axes = (0..axis_count)
            .map(|_| AxisState {
                unit,
                ..AxisState::default()
            })
            .collect();
        Self { axes }
    }

    /// Number of tracked axes.
    pub fn axis_count(&self) -> u8 {
        u8::try_from(self.axes.len()).unwrap_or(u8::MAX)
    }

    /// State of `axis` (1-based).
    pub fn axis(&self, axis: u8) -> Option<&AxisState> {
        usize::from(axis)
            .checked_sub(1)
            .and_then(|index| self.axes.get(index))
    }

    fn axis_mut(&mut self, axis: u8) -> Option<&mut AxisState> {
        usize::from(axis)
            .checked_sub(1)
            .and_then(move |index| self.axes.get_mut(index))
    }

    /// Last known position.
    pub fn position(&self, axis: u8) -> Option<i64> {
        self.axis(axis).and_then(|state| state.position)
    }

    /// Record a confirmed or commanded position.
    pub fn update_position(&mut self, axis: u8, position: i64) {
        if let Some(state) = self.axis_mut(axis) {
            state.position = Some(position);
        }
    }

    /// Forget the position of `axis`.
    pub fn invalidate_position(&mut self, axis: u8) {
        if let Some(state) = self.axis_mut(axis) {
            state.position = None;
        }
    }

    /// Forget the position of every axis.
    pub fn invalidate_all(&mut self) {
        for state in &mut self.axes {
            state.position = None;
        }
    }

    /// Last speed profile.
    pub fn speed_profile(&self, axis: u8) -> Option<SpeedProfile> {
        self.axis(axis).and_then(|state| state.speed)
    }

    /// Record a speed profile.
    pub fn set_speed_profile(&mut self, axis: u8, profile: SpeedProfile) {
        if let Some(state) = self.axis_mut(axis) {
            state.speed = Some(profile);
        }
    }

    /// Unit of `axis` (pulses for an unknown axis).
    pub fn unit(&self, axis: u8) -> Unit {
        self.axis(axis).map(|state| state.unit).unwrap_or_default()
    }

    /// Designate the unit of `axis`.
    ///
    /// The cached position is dropped because it was expressed in the old unit.
    pub fn set_unit(&mut self, axis: u8, unit: Unit) {
        if let Some(state) = self.axis_mut(axis) {
            if state.unit != unit {
                state.unit = unit;
                state.position = None;
            }
        }
    }

    /// Last loop mode.
    pub fn loop_mode(&self, axis: u8) -> Option<LoopMode> {
        self.axis(axis).and_then(|state| state.loop_mode)
    }

    /// Record a loop mode.
    pub fn set_loop_mode(&mut self, axis: u8, mode: LoopMode) {
        if let Some(state) = self.axis_mut(axis) {
            state.loop_mode = Some(mode);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_start_unknown() {
        let tracker = AxisTracker::new(3, Unit::Pulse);
        assert_eq!(tracker.axis_count(), 3);
        assert_eq!(tracker.position(1), None);
        assert_eq!(tracker.position(0), None);
        assert_eq!(tracker.position(4), None);
    }

    #[test]
    fn update_and_invalidate() {
        let mut tracker = AxisTracker::new(2, Unit::Pulse);
        tracker.update_position(2, -300);
        assert_eq!(tracker.position(2), Some(-300));
        assert_eq!(tracker.position(1), None);

        tracker.update_position(1, 10);
        tracker.invalidate_position(2);
        assert_eq!(tracker.position(2), None);
        assert_eq!(tracker.position(1), Some(10));

        tracker.invalidate_all();
        assert_eq!(tracker.position(1), None);

        // Out-of-range axes are ignored.
        tracker.update_position(9, 1);
        assert_eq!(tracker.position(9), None);
    }

    #[test]
    fn unit_change_drops_position() {
        let mut tracker = AxisTracker::new(3, Unit::Pulse);
        tracker.update_position(1, 1000);
        tracker.set_unit(1, Unit::Pulse);
        assert_eq!(tracker.position(1), Some(1000));

        tracker.set_unit(1, Unit::Micrometer);
        assert_eq!(tracker.unit(1), Unit::Micrometer);
        assert_eq!(tracker.position(1), None);
    }

    #[test]
    fn speed_and_loop_are_per_axis() {
        let mut tracker = AxisTracker::new(3, Unit::Pulse);
        let profile = SpeedProfile::new(1, 2, 3).unwrap();
        tracker.set_speed_profile(3, profile);
        tracker.set_loop_mode(3, LoopMode::Closed);
        assert_eq!(tracker.speed_profile(3), Some(profile));
        assert_eq!(tracker.speed_profile(1), None);
        assert_eq!(tracker.loop_mode(3), Some(LoopMode::Closed));
    }
}
