use clap::Parser;
use core::convert::Infallible;
use ds18b20::{Address, Ds18b20, Ds18b20Error, Ds18b20Result};
use ds18b20_emu::{EmulatedBus, VirtualSensor};
use embedded_hal::{delay::DelayNs, digital::OutputPin};

/// Reads DS18B20 temperature sensors on an emulated 1-Wire bus
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of sensors on the bus
    #[arg(short, long, default_value_t = 3)]
    sensors: u8,
    /// Power the sensors from the data line
    #[arg(long)]
    parasite: bool,
    /// Drive a strong pullup during conversions and EEPROM writes
    #[arg(long)]
    strong_pullup: bool,
    /// Resolution in bits (9 to 12)
    #[arg(short, long, default_value_t = 12, value_parser = clap::value_parser!(u8).range(9..=12))]
    resolution: u8,
    /// High alarm threshold in °C
    #[arg(long, default_value_t = 30, allow_negative_numbers = true)]
    high: i8,
    /// Low alarm threshold in °C
    #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
    low: i8,
    /// Copy resolution and thresholds to EEPROM
    #[arg(long)]
    persist: bool,
    /// Number of readings per sensor
    #[arg(short = 'n', long, default_value_t = 3)]
    samples: usize,
    /// Corrupt this many scratchpad reads of every sensor
    #[arg(long, default_value_t = 0)]
    corrupt_reads: usize,
    /// Skip the conversion waits instead of sleeping
    #[arg(long)]
    no_wait: bool,
}

fn base_temperature(index: usize) -> f32 {
    15.0 + 7.5 * index as f32
}

fn main() {
    // Initialize the logger
    env_logger::init();
    // Parse command line arguments
    let args = Args::parse();
    // Populate the bus
    let mut bus = EmulatedBus::new();
    for index in 0..args.sensors as usize {
        bus.add_sensor(
            VirtualSensor::new(index as u64 + 1)
                .with_temperature(base_temperature(index))
                .with_parasite_power(args.parasite)
                .with_corrupt_reads(args.corrupt_reads),
        );
    }
    let mut sleep = linux_embedded_hal::Delay;
    let mut skip = bus.delay();
    let mut delay: &mut dyn DelayNs = if args.no_wait { &mut skip } else { &mut sleep };

    let result = if args.strong_pullup {
        let sensors = Ds18b20::<16>::new().with_strong_pullup(bus.strong_pullup());
        run(&args, sensors, &mut bus, &mut delay)
    } else {
        run(&args, Ds18b20::<16>::new(), &mut bus, &mut delay)
    };
    if let Err(e) = result {
        log::error!("{e:?}");
        std::process::exit(1);
    }
}

fn run<const N: usize, P: OutputPin, D: DelayNs>(
    args: &Args,
    mut sensors: Ds18b20<N, P>,
    bus: &mut EmulatedBus,
    delay: &mut D,
) -> Ds18b20Result<(), Infallible> {
    // Enumerate devices on the 1-Wire bus
    let devices = sensors.discover(bus)?;
    log::info!("Found {} devices", devices);
    for index in 0..devices {
        let Some(address) = sensors.address(index) else {
            continue;
        };
        if let Err(e) = configure(args, &mut sensors, bus, delay, &address) {
            log::error!("{address}: configuration failed: {e:?}");
        }
    }
    for sample in 0..args.samples {
        for index in 0..sensors.count() {
            let Some(address) = sensors.address(index) else {
                continue;
            };
            match sensors.read_temperature_fixed(bus, delay, &address) {
                Ok(temp) => log::info!("ROM: {address}, Temperature: {temp}"),
                Err(Ds18b20Error::ScratchpadCrc { computed, received }) => log::warn!(
                    "{address}: CRC mismatch (computed {computed:#04x}, received {received:#04x})"
                ),
                Err(e) => return Err(e),
            }
            // let the room warm up a little
            let celsius = base_temperature(index) + 0.75 * (sample + 1) as f32;
            bus.update_sensor(address.to_u64(), |s| s.set_temperature(celsius));
        }
        while let Some(address) = sensors.alarm_search(bus)? {
            log::info!("ROM: {address}, alarm raised");
        }
    }
    Ok(())
}

fn configure<const N: usize, P: OutputPin, D: DelayNs>(
    args: &Args,
    sensors: &mut Ds18b20<N, P>,
    bus: &mut EmulatedBus,
    delay: &mut D,
    address: &Address,
) -> Ds18b20Result<(), Infallible> {
    let power = sensors.power_mode(bus, address)?;
    sensors.set_resolution(bus, delay, address, args.resolution, args.persist)?;
    sensors.set_alarms(bus, delay, address, args.high, args.low, args.persist)?;
    let (high, low) = sensors.alarms(bus, address)?;
    log::info!(
        "ROM: {address}, {power:?} power, {} bits, alarm below {low} or above {high} °C",
        sensors.resolution(bus, address)?.bits()
    );
    Ok(())
}
