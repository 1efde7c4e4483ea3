//! What the brew controller needs from the scale.

use crate::packet::ScaleCommand;

/// Latest-value view of the scale plus fire-and-forget commands.
///
/// Command methods return `false` when there is no active link; callers
/// decide whether to retry on a later tick.
pub trait ScalePort {
    /// Advance link housekeeping (events, reconnects, watchdog).
    fn poll(&mut self);
    fn is_connected(&self) -> bool;
    fn weight(&self) -> f32;
    fn flow_rate(&self) -> f32;
    /// Age of the newest accepted packet, `None` before the first one.
    fn packet_age_ms(&self) -> Option<u64>;
    /// Ask for a link; the connection completes on later polls.
    fn connect(&mut self);
    fn disconnect(&mut self);
    fn send(&mut self, command: ScaleCommand) -> bool;

    fn tare(&mut self) -> bool {
        self.send(ScaleCommand::Tare)
    }
    fn start_timer(&mut self) -> bool {
        self.send(ScaleCommand::StartTimer)
    }
    fn stop_timer(&mut self) -> bool {
        self.send(ScaleCommand::StopTimer)
    }
    fn reset_timer(&mut self) -> bool {
        self.send(ScaleCommand::ResetTimer)
    }
    fn start_and_tare(&mut self) -> bool {
        self.send(ScaleCommand::StartAndTare)
    }
    fn beep(&mut self) -> bool {
        self.send(ScaleCommand::Beep)
    }
}
