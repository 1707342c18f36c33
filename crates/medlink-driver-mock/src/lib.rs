//! Mock pump driver for testing without physical hardware.
//!
//! [`MockPumpDriver`] emulates the device end of the wireless link: test code
//! scripts its history log and status registers, and every read goes through
//! the real wire encoders and decoders in `medlink-protocol`, so the mock
//! exercises the same byte paths a hardware driver would.
//!
//! # Example
//!
//! ```rust,ignore
//! let driver = MockPumpDriver::new();
//! driver.push_cgm_record(1, 1000, 120);
//! driver.push_bolus_record(2, 1100, 7, 2500, 2400);
//! driver.connect("00:11:22:33:44:55").await?;
//!
//! let cargo = driver.get_history_logs(0).await?;
//! let records = parse_history_log_stream_cargo(&cargo, 0);
//! assert_eq!(records.len(), 2);
//! ```

mod driver;

pub use driver::MockPumpDriver;
