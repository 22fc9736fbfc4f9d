//! Names and constants shared by host and guest.
//!
//! Adding or removing an import here requires the guest module to be rebuilt
//! in lockstep; there is no version negotiation.

/// Module namespace every host function is imported under.
pub const IMPORT_MODULE: &str = "env";

/// `(ptr: i32, len: i32)` -- log UTF-8 text.
pub const LOG_TEXT: &str = "js_println";
/// `(value: f64)` -- log a number.
pub const LOG_NUMBER: &str = "js_println_num";
/// `(ptr: i32, len: i32)` -- modal alert.
pub const ALERT: &str = "js_alert";
/// `(err_ptr, err_len, file_ptr, file_len, line: i32)` -- terminal fault.
pub const PANIC: &str = "js_panic";
/// `(mask: i32)` -- clear buffers.
pub const GL_CLEAR: &str = "glClear";
/// `(r, g, b, a: f32)` -- set the clear colour.
pub const GL_CLEAR_COLOR: &str = "glClearColor";
/// `(pages: i32) -> i32` -- grow linear memory, returns previous page count or -1.
pub const GROW_MEMORY: &str = "js_grow_memory";
/// `() -> i32` -- current linear memory size in pages.
pub const MEMORY_PAGES: &str = "js_memory_pages";

/// Every import the host provides, in registration order.
pub const HOST_IMPORTS: [&str; 8] = [
    LOG_TEXT,
    LOG_NUMBER,
    ALERT,
    PANIC,
    GL_CLEAR,
    GL_CLEAR_COLOR,
    GROW_MEMORY,
    MEMORY_PAGES,
];

/// Default export name of the one-time setup entry point.
pub const SETUP_EXPORT: &str = "__main";
/// Default export name of the per-frame entry point.
pub const FRAME_EXPORT: &str = "__draw";
/// Default export name of the guest's linear memory.
pub const MEMORY_EXPORT: &str = "memory";

/// Size of one linear memory page in bytes.
pub const WASM_PAGE_SIZE: u64 = 65_536;

/// `glClear` bit selecting the depth buffer.
pub const DEPTH_BUFFER_BIT: u32 = 0x0000_0100;
/// `glClear` bit selecting the stencil buffer.
pub const STENCIL_BUFFER_BIT: u32 = 0x0000_0400;
/// `glClear` bit selecting the colour buffer.
pub const COLOR_BUFFER_BIT: u32 = 0x0000_4000;
