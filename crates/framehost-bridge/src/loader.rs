//! Module loader.
//!
//! [`ModuleLoader`] fetches a guest binary from a [`ModuleSource`], compiles
//! it, verifies the entry-point contract, and instantiates it into a
//! [`Session`].  It performs exactly one fetch and one instantiation per
//! load and never retries; retry policy belongs to the caller.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use url::Url;
use wasmtime::{Engine, ExternType, Module};

use crate::abi::{HOST_IMPORTS, IMPORT_MODULE};
use crate::alert::AlertSink;
use crate::config::{BridgeConfig, EntryPoints};
use crate::error::{BridgeError, Result};
use crate::graphics::GraphicsContext;
use crate::session::Session;

/// Where a guest binary comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    /// An `http` or `https` location.
    Url(Url),
    /// A file on the local filesystem.
    Path(PathBuf),
}

impl ModuleSource {
    /// Build a source from a local path.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }
}

impl FromStr for ModuleSource {
    type Err = BridgeError;

    /// `http(s)://` becomes a URL, `file://` and everything else a path.
    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with("http://") || s.starts_with("https://") {
            let url = Url::parse(s).map_err(|e| BridgeError::LoadFailure {
                reason: format!("invalid module url `{s}`: {e}"),
            })?;
            return Ok(Self::Url(url));
        }
        if s.starts_with("file://") {
            let url = Url::parse(s).map_err(|e| BridgeError::LoadFailure {
                reason: format!("invalid module url `{s}`: {e}"),
            })?;
            let path = url.to_file_path().map_err(|()| BridgeError::LoadFailure {
                reason: format!("`{s}` does not name a local file"),
            })?;
            return Ok(Self::Path(path));
        }
        Ok(Self::Path(PathBuf::from(s)))
    }
}

impl fmt::Display for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Compiles guest modules and turns them into sessions.
pub struct ModuleLoader {
    engine: Engine,
    config: BridgeConfig,
    http: reqwest::Client,
}

impl ModuleLoader {
    /// Create a loader with its own wasmtime [`Engine`].
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;

        let mut wasm_config = wasmtime::Config::new();
        wasm_config.consume_fuel(config.fuel_per_call.is_some());
        wasm_config.wasm_memory64(false);

        let engine = Engine::new(&wasm_config).map_err(|e| BridgeError::LoadFailure {
            reason: format!("failed to create wasm engine: {e}"),
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .build()
            .map_err(|e| BridgeError::LoadFailure {
                reason: format!("failed to create http client: {e}"),
            })?;

        tracing::info!(
            fuel_per_call = ?config.fuel_per_call,
            max_memory = config.max_memory,
            "module loader initialized"
        );

        Ok(Self {
            engine,
            config,
            http,
        })
    }

    /// Create a loader with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(BridgeConfig::default())
    }

    /// Return a reference to the wasmtime [`Engine`].
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Return a reference to the current [`BridgeConfig`].
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Fetch the raw module bytes.  One attempt, no retry.
    pub async fn fetch(&self, source: &ModuleSource) -> Result<Vec<u8>> {
        let bytes = match source {
            ModuleSource::Path(path) => self.read_file(path).await?,
            ModuleSource::Url(url) => self.fetch_url(url).await?,
        };
        tracing::debug!(source = %source, size_bytes = bytes.len(), "fetched module bytes");
        Ok(bytes)
    }

    async fn fetch_url(&self, url: &Url) -> Result<Vec<u8>> {
        let load_failure = |e: reqwest::Error| BridgeError::LoadFailure {
            reason: format!("fetching {url} failed: {e}"),
        };

        let limit = self.config.max_module_bytes;

        let mut response = self
            .http
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(load_failure)?;

        // The declared length is untrusted: reject it early, and never
        // pre-allocate more than the limit.
        let declared = response.content_length().unwrap_or(0);
        if declared > limit {
            return Err(too_large(&url.to_string(), declared, limit));
        }
        let mut bytes = Vec::with_capacity(usize::try_from(declared).unwrap_or(0));
        while let Some(chunk) = response.chunk().await.map_err(load_failure)? {
            let received = bytes.len() as u64 + chunk.len() as u64;
            if received > limit {
                return Err(too_large(&url.to_string(), received, limit));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let read_failure = |e: std::io::Error| BridgeError::LoadFailure {
            reason: format!("reading {} failed: {e}", path.display()),
        };
        let size = tokio::fs::metadata(path).await.map_err(read_failure)?.len();
        if size > self.config.max_module_bytes {
            return Err(too_large(
                &path.display().to_string(),
                size,
                self.config.max_module_bytes,
            ));
        }
        tokio::fs::read(path).await.map_err(read_failure)
    }

    /// Compile module bytes off the async runtime.
    pub async fn compile(&self, bytes: Vec<u8>) -> Result<Module> {
        let engine = self.engine.clone();
        let module = tokio::task::spawn_blocking(move || Module::new(&engine, &bytes))
            .await
            .map_err(|e| BridgeError::LoadFailure {
                reason: format!("compile task panicked: {e}"),
            })?
            .map_err(|e| BridgeError::LoadFailure {
                reason: format!("compilation failed: {e:#}"),
            })?;
        tracing::info!("compiled wasm module");
        Ok(module)
    }

    /// Fetch and compile without instantiating.
    pub async fn load_module(&self, source: &ModuleSource) -> Result<Module> {
        let bytes = self.fetch(source).await?;
        self.compile(bytes).await
    }

    /// Fetch, compile, verify and instantiate a guest.
    ///
    /// The graphics context and alert sink move into the returned session,
    /// which becomes their sole owner.
    pub async fn load(
        &self,
        source: &ModuleSource,
        graphics: Box<dyn GraphicsContext>,
        alerts: Box<dyn AlertSink>,
    ) -> Result<Session> {
        let module = self.load_module(source).await?;
        let session = Session::instantiate(&self.engine, &module, &self.config, graphics, alerts)?;
        tracing::info!(source = %source, "module loaded");
        Ok(session)
    }
}

fn too_large(source: &str, size: u64, limit: u64) -> BridgeError {
    BridgeError::LoadFailure {
        reason: format!("module at {source} is {size} bytes, over the {limit} byte limit"),
    }
}

/// Check that `module` exports the entry points and memory named in
/// `entry_points`.
///
/// An absent export is [`BridgeError::MissingEntryPoint`]; one that exists
/// with the wrong kind or signature is [`BridgeError::LoadFailure`].
pub fn verify_exports(module: &Module, entry_points: &EntryPoints) -> Result<()> {
    for name in [&entry_points.setup, &entry_points.frame] {
        match module.get_export(name) {
            None => {
                return Err(BridgeError::MissingEntryPoint { name: name.clone() });
            }
            Some(ExternType::Func(ty)) => {
                if ty.params().len() != 0 || ty.results().len() != 0 {
                    return Err(BridgeError::LoadFailure {
                        reason: format!("entry point `{name}` must have type () -> (), found {ty:?}"),
                    });
                }
            }
            Some(other) => {
                return Err(BridgeError::LoadFailure {
                    reason: format!("export `{name}` is not a function ({})", kind_of(&other)),
                });
            }
        }
    }

    match module.get_export(&entry_points.memory) {
        None => Err(BridgeError::MissingEntryPoint {
            name: entry_points.memory.clone(),
        }),
        Some(ExternType::Memory(_)) => Ok(()),
        Some(other) => Err(BridgeError::LoadFailure {
            reason: format!(
                "export `{}` is not a memory ({})",
                entry_points.memory,
                kind_of(&other)
            ),
        }),
    }
}

fn kind_of(ty: &ExternType) -> &'static str {
    match ty {
        ExternType::Func(_) => "func",
        ExternType::Global(_) => "global",
        ExternType::Table(_) => "table",
        ExternType::Memory(_) => "memory",
        #[allow(unreachable_patterns)]
        _ => "other",
    }
}

/// One import or export of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemInfo {
    /// Import module; empty for exports.
    pub module: String,
    /// Item name.
    pub name: String,
    /// `func`, `memory`, `global` or `table`.
    pub kind: &'static str,
}

/// Summary of a module against the host contract.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    /// Everything the module imports.
    pub imports: Vec<ItemInfo>,
    /// Everything the module exports.
    pub exports: Vec<ItemInfo>,
    /// Imports the host does not provide; instantiation would fail.
    pub unresolved_imports: Vec<String>,
    /// Why the entry-point contract is not met, if it is not.
    pub contract_error: Option<String>,
}

impl ModuleReport {
    /// Inspect `module` without instantiating it.
    pub fn from_module(module: &Module, entry_points: &EntryPoints) -> Self {
        let imports: Vec<ItemInfo> = module
            .imports()
            .map(|import| ItemInfo {
                module: import.module().to_owned(),
                name: import.name().to_owned(),
                kind: kind_of(&import.ty()),
            })
            .collect();

        let unresolved_imports = imports
            .iter()
            .filter(|i| i.module != IMPORT_MODULE || !HOST_IMPORTS.contains(&i.name.as_str()))
            .map(|i| format!("{}::{}", i.module, i.name))
            .collect();

        let exports = module
            .exports()
            .map(|export| ItemInfo {
                module: String::new(),
                name: export.name().to_owned(),
                kind: kind_of(&export.ty()),
            })
            .collect();

        Self {
            imports,
            exports,
            unresolved_imports,
            contract_error: verify_exports(module, entry_points)
                .err()
                .map(|e| e.to_string()),
        }
    }

    /// Returns `true` if the module can be run by the bridge.
    pub fn is_runnable(&self) -> bool {
        self.unresolved_imports.is_empty() && self.contract_error.is_none()
    }
}
