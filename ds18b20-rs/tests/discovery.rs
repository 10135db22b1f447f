use ds18b20::{Address, Ds18b20, Ds18b20Error, OneWireError, Resolution};
use ds18b20_emu::{EmulatedBus, VirtualSensor};

fn bus_with(serials: &[u64]) -> (EmulatedBus, Vec<u64>) {
    let mut bus = EmulatedBus::new();
    let roms = serials
        .iter()
        .map(|&serial| bus.add_sensor(VirtualSensor::new(serial)))
        .collect();
    (bus, roms)
}

fn sorted(addresses: &[Address]) -> Vec<u64> {
    let mut roms: Vec<u64> = addresses.iter().map(|a| a.to_u64()).collect();
    roms.sort();
    roms
}

#[test]
fn discovers_every_sensor() {
    let (mut bus, mut roms) = bus_with(&[1, 2, 3, 4, 5]);
    roms.sort();
    let mut sensors: Ds18b20 = Ds18b20::new();
    assert_eq!(sensors.discover(&mut bus).unwrap(), 5);
    assert_eq!(sensors.count(), 5);
    assert_eq!(sorted(sensors.devices()), roms);
    assert!(sensors.devices().iter().all(Address::is_valid));
    assert!(sensors.address(4).is_some());
    assert!(sensors.address(5).is_none());
}

#[test]
fn drops_roms_with_bad_crc() {
    let (mut bus, good) = bus_with(&[1, 2]);
    let mut bad = VirtualSensor::new(3).rom();
    bad[7] ^= 0x01;
    bus.add_sensor(VirtualSensor::new(3).with_rom(bad));

    let mut sensors: Ds18b20 = Ds18b20::new();
    assert_eq!(sensors.discover(&mut bus).unwrap(), 2);
    let mut good = good;
    good.sort();
    assert_eq!(sorted(sensors.devices()), good);
}

#[test]
fn stops_at_capacity() {
    let (mut bus, roms) = bus_with(&[1, 2, 3, 4]);
    let mut sensors = Ds18b20::<2>::new();
    assert_eq!(sensors.discover(&mut bus).unwrap(), 2);
    assert_eq!(sensors.count(), 2);
    assert!(
        sensors
            .devices()
            .iter()
            .all(|a| roms.contains(&a.to_u64()))
    );
}

#[test]
fn empty_bus_finds_nothing() {
    let mut bus = EmulatedBus::new();
    let mut sensors: Ds18b20 = Ds18b20::new();
    assert_eq!(sensors.discover(&mut bus).unwrap(), 0);
    assert!(!sensors.begin(&mut bus).unwrap());
    assert!(sensors.devices().is_empty());
}

#[test]
fn rediscovery_replaces_table() {
    let (mut bus, _) = bus_with(&[1, 2, 3]);
    let mut sensors: Ds18b20 = Ds18b20::new();
    assert!(sensors.begin(&mut bus).unwrap());
    assert_eq!(sensors.count(), 3);

    let (mut other, roms) = bus_with(&[9]);
    assert_eq!(sensors.discover(&mut other).unwrap(), 1);
    assert_eq!(sensors.address(0).map(u64::from), Some(roms[0]));
}

#[test]
fn keeps_other_families() {
    let mut bus = EmulatedBus::new();
    let mut rom = [0x10, 0xaa, 0x55, 0, 0, 0, 1, 0];
    rom[7] = ds18b20::crc8(&rom[..7]);
    bus.add_sensor(VirtualSensor::new(1).with_rom(rom));
    let mut sensors: Ds18b20 = Ds18b20::new();
    assert_eq!(sensors.discover(&mut bus).unwrap(), 1);
    assert_eq!(sensors.address(0).map(|a| a.family_code()), Some(0x10));
}

#[test]
fn operations_on_empty_bus_fail() {
    let mut bus = EmulatedBus::new();
    let mut delay = bus.delay();
    let mut sensors: Ds18b20 = Ds18b20::new();
    let address = Address::from(VirtualSensor::new(1).rom());
    assert!(matches!(
        sensors.read_temperature(&mut bus, &mut delay, &address),
        Err(Ds18b20Error::Bus(OneWireError::NoDevicePresent))
    ));
}

#[test]
fn alarm_search_reports_alarmed_sensors() {
    let mut bus = EmulatedBus::new();
    let hot = bus.add_sensor(
        VirtualSensor::new(1)
            .with_alarms(30, 10)
            .with_temperature(35.0),
    );
    bus.add_sensor(
        VirtualSensor::new(2)
            .with_alarms(30, 10)
            .with_temperature(20.0),
    );
    let cold = bus.add_sensor(
        VirtualSensor::new(3)
            .with_alarms(30, 10)
            .with_temperature(5.0),
    );
    let mut delay = bus.delay();
    let mut sensors: Ds18b20 = Ds18b20::new();

    // nothing converted yet
    assert_eq!(sensors.alarm_search(&mut bus).unwrap(), None);

    sensors
        .convert_all(&mut bus, &mut delay, Resolution::Resolution12bit)
        .unwrap();
    let mut alarmed = Vec::new();
    while let Some(address) = sensors.alarm_search(&mut bus).unwrap() {
        alarmed.push(address.to_u64());
    }
    alarmed.sort();
    let mut expected = vec![hot, cold];
    expected.sort();
    assert_eq!(alarmed, expected);

    // the pass ended, the next call starts over
    assert!(sensors.alarm_search(&mut bus).unwrap().is_some());
}

#[test]
fn alarm_search_on_empty_bus() {
    let mut bus = EmulatedBus::new();
    let mut sensors: Ds18b20 = Ds18b20::new();
    assert_eq!(sensors.alarm_search(&mut bus).unwrap(), None);
}
