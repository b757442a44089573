pub mod sync_support;
