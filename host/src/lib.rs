mod driver;

pub use driver::HostDriver;
