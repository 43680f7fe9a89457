mod degree_celsius;
mod light;
mod percent;
mod voltage;

pub use degree_celsius::DegreeCelsius;
pub use light::Lux;
pub use percent::Percent;
pub use voltage::MilliVolt;
