//! A live guest instance.
//!
//! [`Session`] is the one object that owns everything belonging to a running
//! guest: the wasmtime store (and through it the host state, graphics
//! context and alert sink), the instance, its memory handle, and the two
//! typed entry points.  Dropping the session tears the guest down.

use wasmtime::{Engine, Instance, Linker, Module, Store, StoreLimitsBuilder, Trap, TypedFunc};

use crate::alert::AlertSink;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::graphics::GraphicsContext;
use crate::host::{HostFunctions, HostState};
use crate::loader::verify_exports;
use crate::memory::{ByteRange, MemoryView};
use crate::panic::PanicRecord;

/// Which guest entry point a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    /// The one-time setup function.
    Setup,
    /// The per-frame function.
    Frame,
}

/// One instantiated guest module and the host state bound to it.
pub struct Session {
    store: Store<HostState>,
    instance: Instance,
    memory: MemoryView,
    setup: TypedFunc<(), ()>,
    frame: TypedFunc<(), ()>,
    fuel_per_call: Option<u64>,
}

impl Session {
    /// Instantiate `module` with the host import table.
    ///
    /// The module's exports are verified before anything runs, so a module
    /// without its entry points never executes a single instruction.
    pub fn instantiate(
        engine: &Engine,
        module: &Module,
        config: &BridgeConfig,
        graphics: Box<dyn GraphicsContext>,
        alerts: Box<dyn AlertSink>,
    ) -> Result<Self> {
        let entry_points = &config.entry_points;
        verify_exports(module, entry_points)?;

        let limits = StoreLimitsBuilder::new()
            .memory_size(config.max_memory)
            .instances(1)
            .build();
        let mut store = Store::new(engine, HostState::new(graphics, alerts, limits));
        store.limiter(|state| &mut state.limits);
        if let Some(fuel) = config.fuel_per_call {
            store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::LoadFailure {
                    reason: format!("failed to set fuel: {e}"),
                })?;
        }

        let mut linker: Linker<HostState> = Linker::new(engine);
        HostFunctions::register(&mut linker)?;

        let instance = linker
            .instantiate(&mut store, module)
            .map_err(|e| BridgeError::LoadFailure {
                reason: format!("instantiation failed: {e:#}"),
            })?;

        let memory = instance
            .get_memory(&mut store, &entry_points.memory)
            .map(MemoryView::new)
            .ok_or_else(|| BridgeError::MissingEntryPoint {
                name: entry_points.memory.clone(),
            })?;
        store.data_mut().memory = Some(memory);

        let setup = typed_entry(&instance, &mut store, &entry_points.setup)?;
        let frame = typed_entry(&instance, &mut store, &entry_points.frame)?;

        tracing::info!(
            pages = memory.page_count(&store),
            setup = %entry_points.setup,
            frame = %entry_points.frame,
            "guest instantiated"
        );

        Ok(Self {
            store,
            instance,
            memory,
            setup,
            frame,
            fuel_per_call: config.fuel_per_call,
        })
    }

    /// Run the setup entry point.
    pub fn call_setup(&mut self) -> Result<()> {
        self.invoke(EntryPoint::Setup)
    }

    /// Run the per-frame entry point.
    pub fn call_frame(&mut self) -> Result<()> {
        self.invoke(EntryPoint::Frame)
    }

    /// Call one entry point to completion.
    ///
    /// A guest panic comes back as [`BridgeError::GuestPanic`]; any other
    /// trap as [`BridgeError::Trap`].  Both are terminal.
    fn invoke(&mut self, entry: EntryPoint) -> Result<()> {
        if let Some(record) = self.panic_record() {
            return Err(BridgeError::GuestPanic(record.clone()));
        }
        if let Some(fuel) = self.fuel_per_call {
            self.store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::Trap(format!("failed to refuel: {e}")))?;
        }

        let func = match entry {
            EntryPoint::Setup => &self.setup,
            EntryPoint::Frame => &self.frame,
        };
        match func.call(&mut self.store, ()) {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Some(record) = self.panic_record() {
                    return Err(BridgeError::GuestPanic(record.clone()));
                }
                let reason = match err.downcast_ref::<Trap>() {
                    Some(trap) => trap.to_string(),
                    None => format!("{err:#}"),
                };
                tracing::error!(?entry, %reason, "guest trapped");
                Err(BridgeError::Trap(reason))
            }
        }
    }

    /// The panic reported by the guest, if any.
    pub fn panic_record(&self) -> Option<&PanicRecord> {
        self.store.data().panic_channel().record()
    }

    /// Present `message` through the session's alert sink.
    pub fn alert(&mut self, message: &str) {
        self.store.data_mut().alert(message);
    }

    /// The live memory view.
    pub fn memory(&self) -> MemoryView {
        self.memory
    }

    /// Current linear memory size in pages.
    pub fn page_count(&self) -> u64 {
        self.memory.page_count(&self.store)
    }

    /// Current linear memory size in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.memory.size_bytes(&self.store)
    }

    /// Read and decode a range of guest memory.
    pub fn read_text(&self, range: ByteRange) -> Result<String> {
        self.memory.read_text(&self.store, range)
    }

    /// Copy a range of guest memory.
    pub fn read_bytes(&self, range: ByteRange) -> Result<Vec<u8>> {
        self.memory
            .read_bytes(&self.store, range)
            .map(<[u8]>::to_vec)
    }

    /// Write bytes into guest memory, e.g. to seed input for the guest.
    pub fn write_bytes(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let size = self.memory.size_bytes(&self.store);
        let out_of_bounds = || BridgeError::OutOfBounds {
            offset,
            len: bytes.len() as u64,
            size,
        };
        let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
        self.memory
            .memory()
            .write(&mut self.store, start, bytes)
            .map_err(|_| out_of_bounds())
    }

    /// Grow guest memory on the host's initiative.
    pub fn grow(&mut self, pages: u64) -> Result<u64> {
        self.memory.grow(&mut self.store, pages)
    }

    /// Number of host-side failures contained so far.
    pub fn contained_faults(&self) -> u64 {
        self.store.data().contained_faults()
    }

    /// The underlying wasmtime instance.
    pub fn instance(&self) -> &Instance {
        &self.instance
    }
}

fn typed_entry(
    instance: &Instance,
    store: &mut Store<HostState>,
    name: &str,
) -> Result<TypedFunc<(), ()>> {
    let func = instance
        .get_func(&mut *store, name)
        .ok_or_else(|| BridgeError::MissingEntryPoint {
            name: name.to_owned(),
        })?;
    func.typed::<(), ()>(&*store)
        .map_err(|e| BridgeError::LoadFailure {
            reason: format!("entry point `{name}` has the wrong signature: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::RecordingAlerts;
    use crate::graphics::RecordingContext;

    fn instantiate(wat: &str, config: &BridgeConfig) -> Result<Session> {
        let mut wasm_config = wasmtime::Config::new();
        wasm_config.consume_fuel(config.fuel_per_call.is_some());
        let engine = Engine::new(&wasm_config).expect("engine creation must succeed in tests");
        let module = Module::new(&engine, wat).expect("test module must compile");
        Session::instantiate(
            &engine,
            &module,
            config,
            Box::new(RecordingContext::new()),
            Box::new(RecordingAlerts::new()),
        )
    }

    const COUNTER: &str = r#"
        (module
          (memory (export "memory") 1)
          (global $frames (mut i32) (i32.const 0))
          (func (export "__main") (i32.store (i32.const 0) (i32.const 7)))
          (func (export "__draw")
            (global.set $frames (i32.add (global.get $frames) (i32.const 1)))
            (i32.store (i32.const 4) (global.get $frames))))
    "#;

    #[test]
    fn entry_points_run_and_touch_memory() {
        let mut session = instantiate(COUNTER, &BridgeConfig::default()).unwrap();
        session.call_setup().unwrap();
        session.call_frame().unwrap();
        session.call_frame().unwrap();

        let bytes = session.read_bytes(ByteRange::new(0, 8)).unwrap();
        assert_eq!(&bytes[..4], &7u32.to_le_bytes());
        assert_eq!(&bytes[4..], &2u32.to_le_bytes());
    }

    #[test]
    fn host_written_text_reads_back() {
        let mut session = instantiate(COUNTER, &BridgeConfig::default()).unwrap();
        session.write_bytes(100, "grüße".as_bytes()).unwrap();
        let range = ByteRange::new(100, "grüße".len() as u64);
        assert_eq!(session.read_text(range).unwrap(), "grüße");
    }

    #[test]
    fn write_past_end_is_out_of_bounds() {
        let mut session = instantiate(COUNTER, &BridgeConfig::default()).unwrap();
        let err = session.write_bytes(65_535, b"xy").unwrap_err();
        assert!(matches!(err, BridgeError::OutOfBounds { .. }));
    }

    #[test]
    fn write_at_huge_offset_is_out_of_bounds() {
        let mut session = instantiate(COUNTER, &BridgeConfig::default()).unwrap();
        match session.write_bytes(u64::MAX, b"x") {
            Err(BridgeError::OutOfBounds { offset, len, size }) => {
                assert_eq!(offset, u64::MAX);
                assert_eq!(len, 1);
                assert_eq!(size, 65_536);
            }
            other => panic!("expected OutOfBounds, got: {other:?}"),
        }
    }

    #[test]
    fn host_growth_respects_max_memory() {
        let config = BridgeConfig::default().with_max_memory(2 * 65_536);
        let mut session = instantiate(COUNTER, &config).unwrap();
        assert_eq!(session.grow(1).unwrap(), 1);
        assert!(matches!(
            session.grow(1),
            Err(BridgeError::MemoryGrowth { .. })
        ));
        assert_eq!(session.page_count(), 2);
    }

    #[test]
    fn missing_frame_export_is_reported() {
        let wat = r#"
            (module
              (memory (export "memory") 1)
              (func (export "__main")))
        "#;
        match instantiate(wat, &BridgeConfig::default()) {
            Err(BridgeError::MissingEntryPoint { name }) => assert_eq!(name, "__draw"),
            Err(other) => panic!("expected MissingEntryPoint, got: {other}"),
            Ok(_) => panic!("expected MissingEntryPoint, got a session"),
        }
    }

    #[test]
    fn unreachable_is_a_trap() {
        let wat = r#"
            (module
              (memory (export "memory") 1)
              (func (export "__main"))
              (func (export "__draw") unreachable))
        "#;
        let mut session = instantiate(wat, &BridgeConfig::default()).unwrap();
        session.call_setup().unwrap();
        let err = session.call_frame().unwrap_err();
        assert!(matches!(err, BridgeError::Trap(_)));
        assert!(err.is_terminal());
    }

    #[test]
    fn fuel_exhaustion_is_a_trap() {
        let wat = r#"
            (module
              (memory (export "memory") 1)
              (func (export "__main"))
              (func (export "__draw") (loop $spin (br $spin))))
        "#;
        let config = BridgeConfig::default().with_fuel_per_call(Some(10_000));
        let mut session = instantiate(wat, &config).unwrap();
        session.call_setup().unwrap();
        assert!(matches!(session.call_frame(), Err(BridgeError::Trap(_))));
    }

    #[test]
    fn fuel_is_refilled_for_every_call() {
        let wat = r#"
            (module
              (memory (export "memory") 1)
              (func (export "__main"))
              (func (export "__draw")
                (local $i i32)
                (loop $l
                  (local.set $i (i32.add (local.get $i) (i32.const 1)))
                  (br_if $l (i32.lt_u (local.get $i) (i32.const 100))))))
        "#;
        let config = BridgeConfig::default().with_fuel_per_call(Some(5_000));
        let mut session = instantiate(wat, &config).unwrap();
        session.call_setup().unwrap();
        for _ in 0..20 {
            session.call_frame().unwrap();
        }
    }
}
