//! Channel lifecycle, transmission and removal through the public reader API

mod common;

use std::error::Error as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use common::{FakeCard, contactless_reader, insert, polling_reader};
use nexum_apdu_reader::{
    ChannelState, Error, Reader, ReaderEvent, RemovalStrategy, TransportKind, protocols, tech,
};

#[test]
fn test_open_without_card() {
    let reader = contactless_reader();

    let err = reader.open().unwrap_err();
    assert!(matches!(err, Error::ChannelOpen { .. }));
    assert_eq!(reader.state(), ChannelState::Absent);
    assert!(!reader.is_present());
    assert!(reader.atr().is_none());
    assert_eq!(reader.card_description(), "no-tag");
}

#[test]
fn test_discovery_open_close() {
    let reader = contactless_reader();
    let events = reader.events();
    let card = insert(&reader, FakeCard::iso_dep());

    assert_eq!(reader.state(), ChannelState::Disconnected);
    assert!(reader.is_present());
    assert!(!reader.is_channel_open());
    assert_eq!(
        reader.atr().unwrap().as_ref(),
        &[0x3B, 0x80, 0x80, 0x01, 0x01]
    );
    assert_eq!(reader.card_description(), "04 11 22 33 - NfcA, IsoDep, Ndef");
    assert!(matches!(
        events.try_recv(),
        Ok(ReaderEvent::CardInserted { atr: Some(_), .. })
    ));

    reader.open().unwrap();
    assert!(reader.is_channel_open());
    assert_eq!(card.probe.connects(), 1);

    reader.close().unwrap();
    assert_eq!(reader.state(), ChannelState::Absent);
    assert_eq!(card.probe.disconnects(), 1);
}

#[test]
fn test_second_open_is_noop() {
    let reader = contactless_reader();
    let card = insert(&reader, FakeCard::iso_dep());

    reader.open().unwrap();
    reader.open().unwrap();

    assert_eq!(card.probe.connects(), 1);
    assert_eq!(reader.state(), ChannelState::Connected);
}

#[test]
fn test_open_failure_stays_disconnected() {
    let reader = contactless_reader();
    let card = insert(&reader, FakeCard::iso_dep());
    card.probe.fail_connect.store(true, Ordering::SeqCst);

    let err = reader.open().unwrap_err();
    assert!(matches!(err, Error::ChannelOpen { source: Some(_), .. }));
    assert_eq!(reader.state(), ChannelState::Disconnected);
}

#[test]
fn test_double_close() {
    let reader = contactless_reader();
    insert(&reader, FakeCard::iso_dep());
    reader.open().unwrap();

    reader.close().unwrap();
    reader.close().unwrap();
    assert_eq!(reader.state(), ChannelState::Absent);
}

#[test]
fn test_close_failure_still_clears_card() {
    let reader = contactless_reader();
    let card = insert(&reader, FakeCard::iso_dep());
    reader.open().unwrap();
    card.probe.fail_disconnect.store(true, Ordering::SeqCst);

    let err = reader.close().unwrap_err();
    assert!(matches!(err, Error::ChannelClose { .. }));
    assert!(err.source().is_some());
    assert_eq!(reader.state(), ChannelState::Absent);
    assert!(reader.atr().is_none());
}

#[test]
fn test_close_from_disconnected_attempts_disconnect() {
    let reader = contactless_reader();
    let card = insert(&reader, FakeCard::iso_dep());

    reader.close().unwrap();
    assert_eq!(card.probe.disconnects(), 1);
    assert_eq!(reader.state(), ChannelState::Absent);
}

#[test]
fn test_unsupported_discovery_is_swallowed() {
    let reader = contactless_reader();
    let events = reader.events();
    insert(&reader, FakeCard::new(&[tech::NFC_V, tech::NDEF]));

    assert_eq!(reader.state(), ChannelState::Absent);
    assert!(events.try_recv().is_err());
}

#[test]
fn test_transmit_requires_open_channel() {
    let reader = contactless_reader();
    let card = insert(&reader, FakeCard::iso_dep());
    card.probe.respond_with(&[0x90, 0x00]);

    let err = reader.transmit(&[0x00, 0xA4, 0x04, 0x00]).unwrap_err();
    assert!(matches!(err, Error::Transmission { .. }));
    assert!(card.probe.commands.lock().is_empty());
}

#[test]
fn test_transmit_validates_response() {
    let reader = contactless_reader();
    let card = insert(&reader, FakeCard::iso_dep());
    reader.open().unwrap();

    card.probe.respond_with(&[0x90, 0x00]);
    let response = reader.transmit(&[0x00, 0xA4, 0x04, 0x00]).unwrap();
    assert_eq!(response.as_ref(), &[0x90, 0x00]);

    card.probe.respond_with(&[0x6A]);
    let err = reader.transmit(&[0x00, 0xB0, 0x00, 0x00]).unwrap_err();
    assert!(matches!(err, Error::Transmission { .. }));

    // each command forwarded exactly once
    assert_eq!(card.probe.commands.lock().len(), 2);
}

#[test]
fn test_transmit_failure_keeps_cause() {
    let reader = contactless_reader();
    let card = insert(&reader, FakeCard::iso_dep());
    reader.open().unwrap();
    card.probe.fail_transmit.store(true, Ordering::SeqCst);

    let err = reader.transmit(&[0x00, 0xCA, 0x9F, 0x7F]).unwrap_err();
    assert!(err.transport_error().is_some());
    assert_eq!(reader.state(), ChannelState::Connected);
}

#[test]
fn test_concurrent_transmissions_are_serialized() {
    let reader = Arc::new(contactless_reader());
    let card = insert(&reader, FakeCard::iso_dep());
    card.probe.respond_with(&[0x90, 0x00]);
    reader.open().unwrap();

    let handles: Vec<_> = (0..8u8)
        .map(|i| {
            let reader = Arc::clone(&reader);
            thread::spawn(move || {
                for _ in 0..25 {
                    reader.transmit(&[0x80, 0xCA, i, 0x00]).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(card.probe.commands.lock().len(), 200);
}

#[test]
fn test_current_protocol() {
    let reader = contactless_reader();
    assert!(!reader.is_current_protocol(protocols::ISO_14443_4).unwrap());

    insert(&reader, FakeCard::iso_dep());
    assert!(reader.is_current_protocol(protocols::ISO_14443_4).unwrap());
    assert!(!reader.is_current_protocol(protocols::MIFARE_CLASSIC).unwrap());
    assert!(matches!(
        reader.is_current_protocol("FELICA"),
        Err(Error::ProtocolNotFound(_))
    ));
}

#[test]
fn test_mifare_classic_reports_fixed_atr() {
    let reader = contactless_reader();
    insert(
        &reader,
        FakeCard::new(&[tech::NFC_A, tech::MIFARE_CLASSIC, tech::NDEF_FORMATABLE]),
    );

    assert!(reader.is_current_protocol(protocols::MIFARE_CLASSIC).unwrap());
    assert_eq!(
        hex::encode_upper(reader.atr().unwrap()),
        "3B8F8001804F0CA000000306030001000000006A"
    );
}

#[test]
fn test_contact_reader() {
    let reader = Reader::new("se", TransportKind::Contact, RemovalStrategy::Native);
    insert(
        &reader,
        FakeCard::new(&[tech::ISO_7816_3, tech::ISO_7816_3_T0]),
    );

    assert!(!reader.is_contactless());
    assert!(reader.is_current_protocol(protocols::ISO_7816_3_T0).unwrap());
    assert!(reader.is_current_protocol(protocols::ISO_14443_4).is_err());
}

#[test]
fn test_wait_for_removal_times_out() {
    let reader = contactless_reader();
    insert(&reader, FakeCard::iso_dep());

    let start = Instant::now();
    assert!(!reader.wait_for_removal(Duration::from_millis(1000)));
    assert!(start.elapsed() >= Duration::from_millis(1000));
}

#[test]
fn test_wait_for_removal_native() {
    let reader = contactless_reader();
    let events = reader.events();
    let card = insert(&reader, FakeCard::iso_dep());
    let _ = events.try_recv();

    let remover = {
        let card = Arc::clone(&card);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            card.remove();
        })
    };

    let start = Instant::now();
    assert!(reader.wait_for_removal(Duration::from_millis(1000)));
    assert!(start.elapsed() < Duration::from_millis(1000));
    remover.join().unwrap();

    assert!(matches!(
        events.try_recv(),
        Ok(ReaderEvent::CardRemoved { ref reader }) if reader == "nfc"
    ));
}

#[test]
fn test_wait_for_removal_polling() {
    let reader = polling_reader();
    let mut card = FakeCard::iso_dep();
    card.native_removal = false;
    let card = insert(&reader, card);

    let remover = {
        let card = Arc::clone(&card);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            card.remove();
        })
    };

    assert!(reader.wait_for_removal(Duration::from_secs(2)));
    remover.join().unwrap();
}

#[test]
fn test_confirmed_removal_forgets_card() {
    let reader = polling_reader();
    let events = reader.events();
    let mut card = FakeCard::iso_dep();
    card.native_removal = false;
    let card = insert(&reader, card);
    reader.open().unwrap();

    let remover = {
        let card = Arc::clone(&card);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            card.remove();
        })
    };

    assert!(reader.wait_for_removal(Duration::from_secs(2)));
    remover.join().unwrap();

    assert_eq!(reader.state(), ChannelState::Absent);
    assert!(!reader.is_present());
    assert!(!reader.is_channel_open());
    assert!(reader.atr().is_none());
    assert_eq!(reader.card_description(), "no-tag");
    assert_eq!(card.probe.disconnects(), 1);
    assert!(!card.probe.connected.load(Ordering::SeqCst));

    assert!(matches!(events.try_recv(), Ok(ReaderEvent::CardInserted { .. })));
    assert!(matches!(events.try_recv(), Ok(ReaderEvent::CardRemoved { .. })));
    assert!(reader.open().is_err());
}

#[test]
fn test_removal_keeps_newer_card() {
    let reader = Arc::new(contactless_reader());
    let first = insert(&reader, FakeCard::iso_dep());

    let swapper = {
        let reader = Arc::clone(&reader);
        let first = Arc::clone(&first);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            let second = insert(&reader, FakeCard::iso_dep());
            first.remove();
            second
        })
    };

    assert!(reader.wait_for_removal(Duration::from_secs(2)));
    let second = swapper.join().unwrap();

    assert_eq!(reader.state(), ChannelState::Disconnected);
    assert!(reader.is_present());
    reader.open().unwrap();
    assert_eq!(second.probe.connects(), 1);
    assert_eq!(second.probe.disconnects(), 0);
}

#[test]
fn test_discovery_races_channel_operations() {
    const DISCOVERIES: usize = 200;

    let reader = Arc::new(contactless_reader());
    let done = Arc::new(AtomicBool::new(false));

    let discoverer = {
        let reader = Arc::clone(&reader);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let cards: Vec<_> = (0..DISCOVERIES)
                .map(|_| {
                    let card = insert(&reader, FakeCard::iso_dep());
                    thread::yield_now();
                    card
                })
                .collect();
            done.store(true, Ordering::SeqCst);
            cards
        })
    };

    let openers: Vec<_> = (0..2)
        .map(|_| {
            let reader = Arc::clone(&reader);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    let _ = reader.open();
                }
            })
        })
        .collect();

    let closer = {
        let reader = Arc::clone(&reader);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                let _ = reader.close();
                thread::yield_now();
            }
        })
    };

    let observer = {
        let reader = Arc::clone(&reader);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            loop {
                let status = reader.status();
                assert_eq!(status.atr.is_some(), status.state != ChannelState::Absent);
                if done.load(Ordering::SeqCst) {
                    break;
                }
            }
        })
    };

    let cards = discoverer.join().unwrap();
    for opener in openers {
        opener.join().unwrap();
    }
    closer.join().unwrap();
    observer.join().unwrap();

    let status = reader.status();
    assert_eq!(reader.state(), status.state);
    assert_eq!(reader.atr(), status.atr);
    assert_eq!(reader.is_present(), status.state != ChannelState::Absent);
    assert_eq!(reader.is_channel_open(), status.state == ChannelState::Connected);
    assert_eq!(status.atr.is_some(), status.state != ChannelState::Absent);

    reader.close().unwrap();
    assert_eq!(reader.state(), ChannelState::Absent);
    assert!(reader.atr().is_none());
    assert!(!reader.is_channel_open());

    // every superseded or closed card was released
    assert_eq!(cards.len(), DISCOVERIES);
    for card in &cards {
        assert!(!card.probe.connected.load(Ordering::SeqCst));
    }
}

#[test]
fn test_cancel_removal_wait() {
    let reader = Arc::new(contactless_reader());
    insert(&reader, FakeCard::iso_dep());

    let canceller = {
        let reader = Arc::clone(&reader);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            reader.cancel_removal_wait();
        })
    };

    let start = Instant::now();
    assert!(!reader.wait_for_removal(Duration::from_secs(10)));
    assert!(start.elapsed() < Duration::from_secs(2));
    canceller.join().unwrap();
}

#[test]
fn test_wait_without_card_returns_immediately() {
    let reader = contactless_reader();
    let start = Instant::now();
    assert!(reader.wait_for_removal(Duration::from_secs(10)));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_native_arm_failure_reports_no_removal() {
    let reader = contactless_reader();
    let mut card = FakeCard::iso_dep();
    card.native_removal = false;
    insert(&reader, card);

    assert!(!reader.wait_for_removal(Duration::from_secs(10)));
}
