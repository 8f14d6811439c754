//! WebAssembly-backed chamber sandboxes (wasmtime).
//!
//! Artifact contract: exports `memory`, `saveMemory() -> i32`,
//! `saveSize() -> i32`, `load()`, `init(i32, i32)` and `render() -> i32`.
//! The only host import provided is `env.logWasm(ptr, len)`; any other
//! import resolves to a function that traps when called.

use std::ops::Range;

use tracing::debug;
use wasmtime::{
    Caller, Config, Engine, Instance, Linker, Memory, Module, Store, TypedFunc, WasmParams,
    WasmResults,
};

use crate::error::SandboxError;
use crate::sandbox::{Sandbox, SandboxFactory, StateRegion};

/// Compiles chamber artifacts and instantiates them in fresh stores.
#[derive(Clone)]
pub struct WasmEngine {
    engine: Engine,
    linker: Linker<()>,
    fuel_per_frame: Option<u64>,
}

impl WasmEngine {
    /// Creates an engine. With `fuel_per_frame` set, every frame (and `init`)
    /// runs under that instruction budget and traps once it is spent.
    pub fn new(fuel_per_frame: Option<u64>) -> Result<Self, SandboxError> {
        let mut config = Config::new();
        config.consume_fuel(fuel_per_frame.is_some());
        let engine = Engine::new(&config).map_err(|e| SandboxError::Instantiate(e.to_string()))?;
        
        let mut linker = Linker::new(&engine);
        linker
            .func_wrap("env", "logWasm", log_wasm)
            .map_err(|e| SandboxError::Instantiate(e.to_string()))?;
        
        Ok(Self {
            engine,
            linker,
            fuel_per_frame,
        })
    }
    
    pub fn fuel_per_frame(&self) -> Option<u64> {
        self.fuel_per_frame
    }
    
    /// Compiles and instantiates one artifact (binary or text format).
    pub fn instantiate_wasm(&self, artifact: &[u8]) -> Result<WasmSandbox, SandboxError> {
        let module = Module::new(&self.engine, artifact)
            .map_err(|e| SandboxError::Compile(format!("{:#}", e)))?;
        
        let mut linker = self.linker.clone();
        linker
            .define_unknown_imports_as_traps(&module)
            .map_err(|e| SandboxError::Instantiate(e.to_string()))?;
        
        let mut store = Store::new(&self.engine, ());
        refuel(&mut store, self.fuel_per_frame)?;
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| SandboxError::Instantiate(format!("{:#}", e)))?;
        
        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| SandboxError::MissingExport("memory".to_string()))?;
        let save_memory = export_func(&instance, &mut store, "saveMemory")?;
        let save_size = export_func(&instance, &mut store, "saveSize")?;
        let load = export_func(&instance, &mut store, "load")?;
        let init = export_func(&instance, &mut store, "init")?;
        let render = export_func(&instance, &mut store, "render")?;
        
        Ok(WasmSandbox {
            store,
            memory,
            save_memory,
            save_size,
            load,
            init,
            render,
            frame_len: 0,
            fuel_per_frame: self.fuel_per_frame,
        })
    }
}

impl SandboxFactory for WasmEngine {
    fn instantiate(&self, artifact: &[u8]) -> Result<Box<dyn Sandbox>, SandboxError> {
        Ok(Box::new(self.instantiate_wasm(artifact)?))
    }
}

/// Host side of `env.logWasm`: forwards chamber log text to tracing.
fn log_wasm(mut caller: Caller<'_, ()>, ptr: i32, len: i32) {
    let Some(memory) = caller.get_export("memory").and_then(|e| e.into_memory()) else {
        return;
    };
    let data = memory.data(&caller);
    match byte_range(ptr as u32 as usize, len as u32 as usize, data.len()) {
        Ok(range) => {
            let text = String::from_utf8_lossy(&data[range]);
            debug!(target: "chamber", "{}", text);
        }
        Err(e) => debug!(target: "chamber", "logWasm ignored: {}", e),
    }
}

fn export_func<P, R>(
    instance: &Instance,
    store: &mut Store<()>,
    name: &str,
) -> Result<TypedFunc<P, R>, SandboxError>
where
    P: WasmParams,
    R: WasmResults,
{
    let func = instance
        .get_func(&mut *store, name)
        .ok_or_else(|| SandboxError::MissingExport(name.to_string()))?;
    func.typed::<P, R>(&*store)
        .map_err(|e| SandboxError::Instantiate(format!("export `{}`: {}", name, e)))
}

fn refuel(store: &mut Store<()>, fuel: Option<u64>) -> Result<(), SandboxError> {
    if let Some(fuel) = fuel {
        store.set_fuel(fuel).map_err(SandboxError::trap)?;
    }
    Ok(())
}

fn byte_range(base: usize, len: usize, memory_size: usize) -> Result<Range<usize>, SandboxError> {
    match base.checked_add(len) {
        Some(end) if end <= memory_size => Ok(base..end),
        _ => Err(SandboxError::OutOfBounds {
            base,
            len,
            memory_size,
        }),
    }
}

/// A live wasmtime instance of one chamber.
pub struct WasmSandbox {
    store: Store<()>,
    memory: Memory,
    save_memory: TypedFunc<(), i32>,
    save_size: TypedFunc<(), i32>,
    load: TypedFunc<(), ()>,
    init: TypedFunc<(i32, i32), ()>,
    render: TypedFunc<(), i32>,
    frame_len: usize,
    fuel_per_frame: Option<u64>,
}

impl WasmSandbox {
    pub fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }
}

impl Sandbox for WasmSandbox {
    fn init(&mut self, width: u32, height: u32) -> Result<(), SandboxError> {
        refuel(&mut self.store, self.fuel_per_frame)?;
        self.init
            .call(&mut self.store, (width as i32, height as i32))
            .map_err(SandboxError::trap)?;
        self.frame_len = width as usize * height as usize * 4;
        Ok(())
    }
    
    /// Starts a frame: the fuel budget is reset here.
    fn state_region(&mut self) -> Result<StateRegion, SandboxError> {
        refuel(&mut self.store, self.fuel_per_frame)?;
        let base = self.save_memory.call(&mut self.store, ()).map_err(SandboxError::trap)?;
        let capacity = self.save_size.call(&mut self.store, ()).map_err(SandboxError::trap)?;
        Ok(StateRegion {
            base: base as u32 as usize,
            capacity: capacity as u32 as usize,
        })
    }
    
    fn write_state(&mut self, region: StateRegion, bytes: &[u8]) -> Result<(), SandboxError> {
        let data = self.memory.data_mut(&mut self.store);
        let range = byte_range(region.base, bytes.len(), data.len())?;
        data[range].copy_from_slice(bytes);
        Ok(())
    }
    
    fn load(&mut self) -> Result<(), SandboxError> {
        self.load.call(&mut self.store, ()).map_err(SandboxError::trap)
    }
    
    fn draw(&mut self, out: &mut Vec<u8>) -> Result<(), SandboxError> {
        let base = self.render.call(&mut self.store, ()).map_err(SandboxError::trap)?;
        let data = self.memory.data(&self.store);
        let range = byte_range(base as u32 as usize, self.frame_len, data.len())?;
        out.clear();
        out.extend_from_slice(&data[range]);
        Ok(())
    }
}
