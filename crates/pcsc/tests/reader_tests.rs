//! Tests against a live PC/SC service; each one skips itself when no service,
//! reader or card is available

mod common;

use std::time::Duration;

use nexum_apdu_reader::{ChannelState, ReaderEvent, ReaderFlags, protocols};
use nexum_apdu_transport_pcsc::{PcscDeviceManager, PcscError};

#[test]
fn test_list_readers() {
    let manager = match PcscDeviceManager::new() {
        Ok(manager) => manager,
        Err(_) => {
            println!("Skipping test, PC/SC not available");
            return;
        }
    };

    match manager.list_readers() {
        Ok(readers) => {
            assert!(!readers.is_empty(), "Expected at least one reader");
            for reader in readers {
                assert_eq!(reader.has_card(), reader.atr().is_some());
            }
        }
        Err(PcscError::NoReadersAvailable) => println!("Skipping test, no readers"),
        Err(e) => println!("Could not list readers: {e:?}"),
    }
}

#[test]
fn test_unknown_reader() {
    let Ok(manager) = PcscDeviceManager::new() else {
        println!("Skipping test, PC/SC not available");
        return;
    };

    assert!(manager.reader("no such reader 0").is_err());
}

#[test]
fn test_detection_open_transmit_close() {
    let Some((manager, info)) = common::get_reader_with_card() else {
        println!("Skipping test, no card available");
        return;
    };

    let reader = manager.reader(info.name()).unwrap();
    assert!(!reader.is_contactless());
    reader.activate_protocol(protocols::ISO_7816_3).unwrap();
    assert!(reader.reader_mode().flags.contains(ReaderFlags::CONTACT));

    let events = reader.events();
    let monitor = manager.monitor(reader.clone());
    reader.enable_detection(&monitor).unwrap();

    let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(event, ReaderEvent::CardInserted { .. }));
    assert_eq!(reader.state(), ChannelState::Disconnected);

    reader.open().unwrap();
    assert!(reader.is_channel_open());

    // SELECT with an empty AID; any status word will do
    let response = reader.transmit(&[0x00, 0xA4, 0x04, 0x00, 0x00]).unwrap();
    assert!(response.len() >= 2);

    reader.close().unwrap();
    assert_eq!(reader.state(), ChannelState::Absent);

    reader.disable_detection(&monitor).unwrap();
    assert!(!monitor.is_running());
}

#[test]
fn test_detection_requires_contact_protocol() {
    let Some((manager, info)) = common::get_reader_with_card() else {
        println!("Skipping test, no card available");
        return;
    };

    let reader = manager.reader(info.name()).unwrap();
    let monitor = manager.monitor(reader.clone());
    assert!(reader.enable_detection(&monitor).is_err());
    assert!(!monitor.is_running());
}
