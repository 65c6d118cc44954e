//! Uniform write queue
//!
//! Parameter delegates run on whatever thread mutated the parameter. They
//! record a `UniformWrite` here; the owning effect drains the queue on the
//! render thread right before it draws. Only the latest value per target is
//! kept, so an effect that is never rendered holds at most one pending write
//! per uniform.

use std::sync::Arc;

use parking_lot::Mutex;

use super::types::{Delegate, ParameterValue};
use crate::gpu_context::RenderContext;
use crate::shaders::{ShaderError, ShaderProgram, UniformValue};

/// A pending write of `value` to the uniform (or setting) named `target`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformWrite {
    pub target: &'static str,
    pub value: UniformValue,
}

impl From<ParameterValue> for UniformValue {
    fn from(value: ParameterValue) -> Self {
        match value {
            ParameterValue::Float(v) => UniformValue::Float(v),
            ParameterValue::Int(v) => UniformValue::Int(v),
            ParameterValue::Bool(v) => UniformValue::Bool(v),
            ParameterValue::Choice(i) => UniformValue::Int(i as i32),
        }
    }
}

/// Multi-producer, coalescing set of uniform writes consumed on the render
/// thread.
#[derive(Debug, Clone, Default)]
pub struct UniformQueue {
    pending: Arc<Mutex<Vec<UniformWrite>>>,
}

impl UniformQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write, replacing any pending write to the same target.
    pub fn push(&self, target: &'static str, value: UniformValue) {
        record(&self.pending, target, value);
    }

    /// Delegate forwarding parameter values unchanged to `target`.
    pub fn delegate(&self, target: &'static str) -> Delegate {
        self.delegate_with(target, |value| UniformValue::from(*value))
    }

    /// Delegate converting parameter values with `convert` before queueing.
    pub fn delegate_with(
        &self,
        target: &'static str,
        convert: impl Fn(&ParameterValue) -> UniformValue + Send + Sync + 'static,
    ) -> Delegate {
        let pending = Arc::clone(&self.pending);
        Box::new(move |value: &ParameterValue| record(&pending, target, convert(value)))
    }

    /// Take every pending write, ordered by each target's first write.
    pub fn drain(&self) -> impl Iterator<Item = UniformWrite> {
        std::mem::take(&mut *self.pending.lock()).into_iter()
    }

    /// Number of targets with a pending write
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Make `program` current and apply every pending write to it.
    ///
    /// A write the program cannot accept is a wiring bug in the effect; it is
    /// logged and skipped.
    pub fn apply_to(&self, ctx: &RenderContext, program: &mut ShaderProgram) -> Result<(), ShaderError> {
        program.use_program(ctx)?;
        for write in self.drain() {
            if let Err(e) = program.set_uniform(ctx, write.target, write.value) {
                log::error!("Dropping uniform write to '{}': {}", write.target, e);
                debug_assert!(
                    !matches!(e, ShaderError::UnknownUniform { .. } | ShaderError::NotCurrent { .. }),
                    "{}",
                    e
                );
            }
        }
        Ok(())
    }
}

fn record(pending: &Mutex<Vec<UniformWrite>>, target: &'static str, value: UniformValue) {
    let mut pending = pending.lock();
    match pending.iter_mut().find(|write| write.target == target) {
        Some(write) => write.value = value,
        None => pending.push(UniformWrite { target, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::types::Parameter;
    use std::time::Duration;

    #[test]
    fn test_latest_write_per_target_wins() {
        let queue = UniformQueue::new();
        let contrast = Parameter::float("Contrast", 0.0, 5.0, 1.0).with_delegate(queue.delegate("contrast"));
        let brightness = Parameter::float("Brightness", 0.0, 5.0, 1.0).with_delegate(queue.delegate("brightness"));
        contrast.set_float(2.0).unwrap();
        brightness.set_float(0.5).unwrap();
        contrast.set_float(3.0).unwrap();

        let writes: Vec<_> = queue.drain().collect();
        assert_eq!(
            writes,
            vec![
                UniformWrite { target: "contrast", value: UniformValue::Float(3.0) },
                UniformWrite { target: "brightness", value: UniformValue::Float(0.5) },
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_stays_bounded_without_draining() {
        let queue = UniformQueue::new();
        let param = Parameter::float("Contrast", 0.0, 5.0, 1.0).with_delegate(queue.delegate("contrast"));
        for i in 0..100_000 {
            param.set_float((i % 500) as f32 / 100.0).unwrap();
        }
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain().next().map(|w| w.value), Some(UniformValue::Float(4.99)));
    }

    #[test]
    fn test_delegate_from_other_thread() {
        let queue = UniformQueue::new();
        let param = Arc::new(Parameter::int("Mode", 0, 3, 1).with_delegate(queue.delegate("mode")));
        let remote = Arc::clone(&param);
        std::thread::spawn(move || remote.set_int(2).unwrap()).join().unwrap();
        assert_eq!(queue.drain().next().map(|w| w.value), Some(UniformValue::Int(2)));
    }

    #[test]
    fn test_concurrent_writers_deliver_committed_value() {
        let queue = UniformQueue::new();
        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        let slow = queue.delegate_with("contrast", move |value| {
            if *value == ParameterValue::Float(1.5) {
                let _ = entered_tx.send(());
                std::thread::sleep(Duration::from_millis(100));
            }
            UniformValue::from(*value)
        });
        let param = Arc::new(Parameter::float("Contrast", 0.0, 5.0, 1.0).with_delegate(slow));

        let remote = Arc::clone(&param);
        let writer = std::thread::spawn(move || remote.set_float(1.5).unwrap());
        entered_rx.recv().unwrap();
        param.set_float(3.0).unwrap();
        writer.join().unwrap();

        assert_eq!(param.value(), ParameterValue::Float(3.0));
        let last = queue.drain().last().map(|w| w.value);
        assert_eq!(last, Some(UniformValue::Float(3.0)));
    }

    #[test]
    fn test_reset_delivers_default() {
        let queue = UniformQueue::new();
        let param = Parameter::float("Brightness", 0.0, 5.0, 1.0).with_delegate(queue.delegate("brightness"));
        param.set_float(4.0).unwrap();
        param.reset();
        assert_eq!(queue.drain().collect::<Vec<_>>(), vec![UniformWrite {
            target: "brightness",
            value: UniformValue::Float(1.0),
        }]);
    }

    #[test]
    fn test_converting_delegate() {
        let queue = UniformQueue::new();
        let param = Parameter::choice("Color", ["White", "Red"], 0).with_delegate(queue.delegate_with(
            "color",
            |value| match value {
                ParameterValue::Choice(1) => UniformValue::Vec4([1.0, 0.0, 0.0, 1.0]),
                _ => UniformValue::Vec4([1.0; 4]),
            },
        ));
        param.set_choice(1).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain().next().map(|w| w.value), Some(UniformValue::Vec4([1.0, 0.0, 0.0, 1.0])));
    }

    #[test]
    fn test_parameter_value_to_uniform() {
        assert_eq!(UniformValue::from(ParameterValue::Bool(true)), UniformValue::Bool(true));
        assert_eq!(UniformValue::from(ParameterValue::Choice(3)), UniformValue::Int(3));
    }
}
