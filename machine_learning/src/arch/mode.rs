/// The way a forward pass treats normalization statistics.
///
/// Every mode reuses the same parameters, they only differ in which statistics feed the
/// normalization layers and whether the running statistics are touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Batch statistics, running statistics are updated.
    Train,
    /// Batch statistics, running statistics are left untouched.
    Probe,
    /// Running statistics.
    Infer,
}

impl Mode {
    /// Whether normalization layers should normalize with the current batch's statistics.
    pub fn uses_batch_stats(self) -> bool {
        !matches!(self, Mode::Infer)
    }

    /// Whether normalization layers should fold the batch statistics into their running ones.
    pub fn updates_running_stats(self) -> bool {
        matches!(self, Mode::Train)
    }
}
