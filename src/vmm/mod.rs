pub mod kvm_ctx;
pub mod memory;
pub mod boot;
pub mod devices;
pub mod event_loop;
pub mod terminal;
pub mod run;
#[cfg(test)] pub(crate) mod testing;
