//! Fatal-path diagnostics.
//!
//! Mirrors `scheduler.c`'s `cleanup_and_exit`: invariant violations are not
//! recoverable, so rather than threading a `Result` through every caller
//! this logs the violation and a snapshot of whatever state was passed in,
//! then panics. In a debug build under `panic = "unwind"` this still lets
//! integration tests assert on the panic with `should_panic` /
//! `catch_unwind`.

pub fn dump_and_panic(message: &str) -> ! {
    tracing::error!(%message, "fatal scheduler invariant violation");
    panic!("{message}");
}

/// Like `dump_and_panic`, but also emits a `Debug` snapshot of the
/// offending block's fields, mirroring `scheduler.c`'s
/// `print_base_metadata_block_contents` call from `cleanup_and_exit`.
pub fn dump_block_and_panic(message: &str, block: &crate::block::Block) -> ! {
    tracing::error!(%message, ?block, "fatal scheduler invariant violation");
    panic!("{message}");
}
