/// Receives progress notifications during a decomposition run.
///
/// The callback is invoked synchronously from the caller's thread at the
/// stride configured with
/// [`Deconvolver::set_notification_delay`](crate::Deconvolver::set_notification_delay),
/// and exactly once with `1.0` when `decompose` finishes. Implementations
/// must not call back into the engine.
pub trait ProgressObserver {
    /// Called with the fraction of work completed, in `[0, 1]`.
    fn progress_changed(&mut self, fraction: f32);
}

impl<F: FnMut(f32)> ProgressObserver for F {
    fn progress_changed(&mut self, fraction: f32) {
        self(fraction)
    }
}
