//! Compile-time defaults
//!
//! Generated by build.rs from the library defaults, merged with the file
//! named by `XMIG_CONFIG_RS` when set.

include!(concat!(env!("OUT_DIR"), "/xmig_merged_config.rs"));
