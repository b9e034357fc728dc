pub mod gas_meter;

pub use gas_meter::GasMeterSink;
