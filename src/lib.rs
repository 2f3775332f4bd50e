// lib.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Root level module that imports the feature modules.

pub mod disc;
pub mod error;
pub mod hdd;
pub mod reader;
pub mod refio;
pub mod title;
