pub mod calibrate;
pub mod cancel;
pub mod config;
pub mod consts;
pub mod error;
pub mod fit;
pub mod frame;
pub mod histogram;
pub mod io;
pub mod planck;
pub mod pyrometer;
pub mod spectrum;
pub mod sweep;
