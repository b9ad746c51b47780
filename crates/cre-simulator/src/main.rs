//! Desktop simulator for the cre-data-handler sensor suite.
//!
//! Runs the flight computer's sampling loop against a synthetic flight
//! (pad, boost, coast) in simulated time and reports the latest and median
//! values of a few channels once per simulated second.
//!
//! ```text
//! cre-simulator [OUTPUT]
//! ```
//!
//! When `OUTPUT` is given, every persisted sample is written there as a
//! postcard COBS frame, the same bytes the flight computer sends to its SD
//! card logger.

use std::fs::File;
use std::io::Write as _;

use embedded_io::{ErrorKind, ErrorType};
use log::{error, info};

use cre_data_handler::{
    BaroReading, DataSaver, ImuReading, Sample, SaveError, SensorChannel, SensorSuite,
    SerialSaver, SuiteConfig,
};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Loop period, roughly the IMU's 104 Hz output rate.
const LOOP_PERIOD_MS: u32 = 10;

/// Total simulated time.
const FLIGHT_DURATION_MS: u32 = 20_000;

/// Motor ignition and burnout.
const IGNITION_MS: u32 = 5_000;
const BURNOUT_MS: u32 = 7_000;

const STANDARD_GRAVITY: f32 = 9.81;
const SEA_LEVEL_HPA: f32 = 1013.25;

/// Air-quality sensor is polled far less often than the IMU.
const AIR_QUALITY_PERIOD_MS: u32 = 500;

// ---------------------------------------------------------------------------
// Mock flight
// ---------------------------------------------------------------------------

/// Integrates a one-dimensional flight so the barometer agrees with the IMU.
struct MockFlight {
    altitude_m: f32,
    velocity_mps: f32,
}

impl MockFlight {
    fn new() -> Self {
        Self {
            altitude_m: 0.0,
            velocity_mps: 0.0,
        }
    }

    /// Advance to `now_ms` and return the IMU and barometer readings.
    fn step(&mut self, now_ms: u32) -> (ImuReading, BaroReading) {
        let thrust = if (IGNITION_MS..BURNOUT_MS).contains(&now_ms) {
            60.0
        } else {
            0.0
        };
        let on_pad = now_ms < IGNITION_MS || (self.altitude_m <= 0.0 && thrust == 0.0);

        // Proper acceleration as the accelerometer sees it
        let sensed_z = if on_pad { STANDARD_GRAVITY } else { thrust };

        if !on_pad {
            let dt = LOOP_PERIOD_MS as f32 / 1000.0;
            self.velocity_mps += (thrust - STANDARD_GRAVITY) * dt;
            self.altitude_m = (self.altitude_m + self.velocity_mps * dt).max(0.0);
        }

        // Small deterministic wobble so the median and latest differ
        let t = now_ms as f32 / 1000.0;
        let wobble = 0.3 * (t * 7.0).sin();

        let imu = ImuReading {
            acceleration: [wobble, -wobble, sensed_z + wobble],
            gyro: [0.02 * (t * 3.0).sin(), 0.01, 0.5 * (t * 0.5).cos()],
            temperature: 24.0 + 0.01 * t,
        };
        let baro = BaroReading {
            pressure_hpa: SEA_LEVEL_HPA * (1.0 - self.altitude_m / 44_330.0).powf(5.255),
            altitude_m: self.altitude_m,
        };

        (imu, baro)
    }

    /// Gas resistance drifting slowly, in kOhm.
    fn air_quality(&self, now_ms: u32) -> f32 {
        50.0 + 5.0 * (now_ms as f32 / 4000.0).sin()
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// `embedded_io::Write` over a host file.
struct FilePort(File);

impl ErrorType for FilePort {
    type Error = ErrorKind;
}

impl embedded_io::Write for FilePort {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.0.write(buf).map_err(|_| ErrorKind::Other)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.0.flush().map_err(|_| ErrorKind::Other)
    }
}

/// Counts what would have been persisted when no output file is given.
#[derive(Default)]
struct CountingSaver {
    samples: u32,
}

impl DataSaver for CountingSaver {
    fn save(&mut self, _channel: SensorChannel, _sample: Sample) -> Result<(), SaveError> {
        self.samples += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

const REPORTED: [SensorChannel; 4] = [
    SensorChannel::AccelerometerZ,
    SensorChannel::Altitude,
    SensorChannel::Pressure,
    SensorChannel::AirQuality,
];

fn report(suite: &SensorSuite, now_ms: u32) {
    for channel in REPORTED {
        let latest = suite.latest(channel);
        let median = suite.median(channel);
        info!(
            "t={:>6} ms {:>9}: latest {:>9.3} {} @ {} ms, median {:>9.3} @ {} ms",
            now_ms,
            channel.label(),
            latest.value,
            channel.unit(),
            latest.timestamp_ms,
            median.value,
            median.timestamp_ms
        );
    }
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

fn run<S: DataSaver>(suite: &mut SensorSuite, saver: &mut S) -> u32 {
    let mut flight = MockFlight::new();
    let mut temporal_updates = 0u32;

    // Timestamps start one period after boot, like millis() on the board
    let mut now_ms = LOOP_PERIOD_MS;
    while now_ms <= FLIGHT_DURATION_MS {
        let (imu, baro) = flight.step(now_ms);

        let imu_outcomes = suite.record_imu(now_ms, imu, saver);
        let baro_outcomes = suite.record_baro(now_ms, baro, saver);
        temporal_updates += imu_outcomes
            .iter()
            .chain(baro_outcomes.iter())
            .filter(|o| o.temporal)
            .count() as u32;

        if now_ms % AIR_QUALITY_PERIOD_MS == 0 {
            let outcome = suite.record_air_quality(now_ms, flight.air_quality(now_ms), saver);
            temporal_updates += outcome.temporal as u32;
        }

        if now_ms % 1000 == 0 {
            report(suite, now_ms);
        }

        now_ms += LOOP_PERIOD_MS;
    }

    temporal_updates
}

fn main() {
    env_logger::init();
    info!("Starting cre-data-handler simulator");

    let config = SuiteConfig::default();
    let mut suite = match SensorSuite::new(config) {
        Ok(suite) => suite,
        Err(e) => {
            error!("Invalid suite configuration: {}", e);
            std::process::exit(1);
        }
    };
    for handler in suite.handlers() {
        let sizing = handler.sizing();
        info!(
            "{:>9}: temporal every {} ms, {} slots{}",
            handler.channel().label(),
            handler.interval_ms(),
            sizing.capacity,
            if sizing.clamped { " (clamped)" } else { "" }
        );
    }

    match std::env::args().nth(1) {
        Some(path) => {
            let file = match File::create(&path) {
                Ok(file) => file,
                Err(e) => {
                    error!("Cannot create {}: {}", path, e);
                    std::process::exit(1);
                }
            };
            let mut saver = SerialSaver::new(FilePort(file));
            let updates = run(&mut suite, &mut saver);
            info!(
                "Wrote {} frames to {} ({} temporal updates)",
                saver.frames_written(),
                path,
                updates
            );
        }
        None => {
            let mut saver = CountingSaver::default();
            let updates = run(&mut suite, &mut saver);
            info!(
                "Persisted {} samples ({} temporal updates)",
                saver.samples, updates
            );
        }
    }

    info!("Simulator exiting");
}
