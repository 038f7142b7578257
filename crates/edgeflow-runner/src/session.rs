//! Resource ledger for one runner.
//!
//! Every successful acquisition goes through [`DeviceSession`], which records
//! the matching [`Resource`]. Teardown walks the ledger backwards, so whatever
//! was acquired last is released first, including after a partial
//! construction.

use edgeflow_core::Result;
use edgeflow_device::{DeviceBackend, DeviceBuffer, IoKind, LoadedModel, ModelBlob, RawHandle, Resource};

pub struct DeviceSession<B: DeviceBackend> {
    backend: B,
    ledger: Vec<Resource>,
}

impl<B: DeviceBackend> DeviceSession<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            ledger: Vec::new(),
        }
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Resources still held, in acquisition order.
    pub fn held(&self) -> &[Resource] {
        &self.ledger
    }

    fn track(&mut self, resource: Resource) {
        tracing::trace!(kind = resource.kind(), "acquired");
        self.ledger.push(resource);
    }

    pub fn init_runtime(&mut self) -> Result<()> {
        self.backend.init_runtime()?;
        self.track(Resource::Runtime);
        Ok(())
    }

    pub fn set_device(&mut self, device_id: u32) -> Result<()> {
        self.backend.set_device(device_id)?;
        self.track(Resource::Device(device_id));
        Ok(())
    }

    pub fn create_context(&mut self, device_id: u32) -> Result<RawHandle> {
        let ctx = self.backend.create_context(device_id)?;
        self.track(Resource::Context(ctx));
        Ok(ctx)
    }

    pub fn create_stream(&mut self, context: RawHandle) -> Result<RawHandle> {
        let stream = self.backend.create_stream(context)?;
        self.track(Resource::Stream(stream));
        Ok(stream)
    }

    pub fn load_model(&mut self, blob: &ModelBlob) -> Result<LoadedModel> {
        let model = self.backend.load_model(blob)?;
        self.track(Resource::Model(model.handle));
        Ok(model)
    }

    pub fn alloc(&mut self, size: usize) -> Result<DeviceBuffer> {
        let buffer = self.backend.alloc(size)?;
        self.track(Resource::Buffer(buffer));
        Ok(buffer)
    }

    pub fn bind(
        &mut self,
        model: RawHandle,
        io: IoKind,
        index: usize,
        buffer: &DeviceBuffer,
    ) -> Result<()> {
        self.backend.bind(model, io, index, buffer)?;
        self.track(Resource::Binding { model, io, index });
        Ok(())
    }

    /// Release everything still held, newest first. Failures are logged and
    /// skipped. Safe to call repeatedly.
    pub fn release_all(&mut self) {
        if self.ledger.is_empty() {
            return;
        }
        let count = self.ledger.len();
        // The releasing thread may not be the one that built the session.
        let context = self.ledger.iter().rev().find_map(|r| match r {
            Resource::Context(ctx) => Some(*ctx),
            _ => None,
        });
        if let Some(ctx) = context {
            if let Err(e) = self.backend.set_current_context(ctx) {
                tracing::warn!(
                    backend = self.backend.name(),
                    error = %e,
                    "failed to bind context for teardown"
                );
            }
        }
        while let Some(resource) = self.ledger.pop() {
            if let Err(e) = self.backend.release(resource) {
                tracing::warn!(
                    backend = self.backend.name(),
                    kind = resource.kind(),
                    error = %e,
                    "failed to release device resource"
                );
            }
        }
        tracing::debug!(backend = self.backend.name(), count, "device session released");
    }
}

impl<B: DeviceBackend> Drop for DeviceSession<B> {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeflow_device::{SimBackend, SimFault, SimModelSpec, SimOp};

    fn blob() -> ModelBlob {
        let spec = SimModelSpec::detector(4, 4, &[2]);
        ModelBlob::from_bytes(spec.to_json().unwrap().into_bytes())
    }

    #[test]
    fn releases_in_reverse_order() {
        let backend = SimBackend::new();
        let probe = backend.probe();
        let mut session = DeviceSession::new(backend);
        session.init_runtime().unwrap();
        session.set_device(0).unwrap();
        let ctx = session.create_context(0).unwrap();
        let stream = session.create_stream(ctx).unwrap();
        let model = session.load_model(&blob()).unwrap();
        let acquired = session.held().to_vec();

        session.release_all();
        assert!(session.held().is_empty());
        assert_eq!(probe.live_count(), 0);

        let mut expected = acquired;
        expected.reverse();
        assert_eq!(probe.release_log(), expected);
        assert_eq!(expected[0], Resource::Model(model.handle));
        assert_eq!(expected[1], Resource::Stream(stream));
    }

    #[test]
    fn release_all_is_idempotent() {
        let backend = SimBackend::new();
        let probe = backend.probe();
        let mut session = DeviceSession::new(backend);
        session.init_runtime().unwrap();
        session.release_all();
        session.release_all();
        drop(session);
        assert_eq!(probe.calls(SimOp::Release), 1);
    }

    #[test]
    fn release_failures_do_not_stop_teardown() {
        let backend = SimBackend::new().with_fault(SimFault::on(SimOp::Release));
        let probe = backend.probe();
        let mut session = DeviceSession::new(backend);
        session.init_runtime().unwrap();
        session.set_device(0).unwrap();
        session.release_all();
        assert!(session.held().is_empty());
        assert_eq!(probe.calls(SimOp::Release), 2);
        // The device release failed; the runtime release still happened.
        assert_eq!(probe.live_resources(), vec![Resource::Device(0)]);
    }

    #[test]
    fn failed_acquisition_is_not_recorded() {
        let backend = SimBackend::new().with_fault(SimFault::on(SimOp::SetDevice));
        let mut session = DeviceSession::new(backend);
        session.init_runtime().unwrap();
        assert!(session.set_device(0).is_err());
        assert_eq!(session.held(), &[Resource::Runtime]);
    }
}
