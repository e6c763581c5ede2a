use flarestack_common::{EventSample, SampleError};

/// Joins background and signal into one dataset. If there is no signal,
/// the background is returned as it is.
pub fn assemble(background: EventSample, signal: &EventSample) -> Result<EventSample, SampleError> {
    if signal.is_empty() {
        Ok(background)
    } else {
        background.concatenate(signal)
    }
}
