pub mod bloomsky;
pub mod camera_api;
pub mod homebridge;
