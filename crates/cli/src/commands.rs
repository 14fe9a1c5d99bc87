//! Subcommand implementations

use std::sync::Arc;
use std::time::Duration;

use eyre::{OptionExt, WrapErr};
use nexum_apdu_reader::{Reader, ReaderEvent};
use nexum_apdu_transport_pcsc::{PcscDeviceManager, PcscError};
use tracing::info;

use crate::config::ReaderConfig;

/// How long each removal wait blocks before checking again
const REMOVAL_POLL: Duration = Duration::from_secs(1);

/// List all available readers
pub fn list_readers(manager: &PcscDeviceManager) -> eyre::Result<()> {
    let readers = match manager.list_readers() {
        Ok(readers) => readers,
        Err(PcscError::NoReadersAvailable) => {
            println!("No readers found!");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("Available readers:");
    for (i, reader) in readers.iter().enumerate() {
        match reader.atr() {
            Some(atr) if reader.has_card() => {
                println!("{}. {} (card present, ATR {})", i + 1, reader.name(), hex::encode_upper(atr));
            }
            _ => println!("{}. {} (no card)", i + 1, reader.name()),
        }
    }

    Ok(())
}

/// Pick the named reader, or the first one holding a card, or the first one
fn select_reader(manager: &PcscDeviceManager, name: Option<&str>) -> eyre::Result<Arc<Reader>> {
    let name = match name {
        Some(name) => name.to_string(),
        None => {
            let readers = manager.list_readers()?;
            readers
                .iter()
                .find(|r| r.has_card())
                .or_else(|| readers.first())
                .map(|r| r.name().to_string())
                .ok_or_eyre("no readers found")?
        }
    };

    info!("Using reader: {name}");
    Ok(manager.reader(&name)?)
}

/// Print insert and remove events until the process is interrupted
pub fn watch(
    manager: &PcscDeviceManager,
    reader_name: Option<&str>,
    config: &ReaderConfig,
) -> eyre::Result<()> {
    let reader = select_reader(manager, reader_name)?;
    config.apply(&reader)?;

    let events = reader.events();
    let monitor = manager.monitor(Arc::clone(&reader));
    reader.enable_detection(&monitor)?;
    println!("Watching {} (Ctrl-C to stop)", reader.name());

    for event in events.iter() {
        match event {
            ReaderEvent::CardInserted { reader: name, atr } => {
                let atr = atr.map_or_else(|| "-".to_string(), hex::encode_upper);
                println!("{name}: card inserted, ATR {atr}");
                println!("  {}", reader.card_description());

                while !reader.wait_for_removal(REMOVAL_POLL) {}
            }
            ReaderEvent::CardRemoved { reader: name } => println!("{name}: card removed"),
        }
    }

    reader.disable_detection(&monitor)?;
    Ok(())
}

/// Wait for a card, exchange every APDU and close the channel
pub fn transmit(
    manager: &PcscDeviceManager,
    reader_name: Option<&str>,
    config: &ReaderConfig,
    apdus: &[String],
    timeout: Duration,
) -> eyre::Result<()> {
    let commands = apdus
        .iter()
        .map(|apdu| hex::decode(apdu.replace(' ', "")).wrap_err_with(|| format!("invalid APDU {apdu}")))
        .collect::<eyre::Result<Vec<_>>>()?;

    let reader = select_reader(manager, reader_name)?;
    config.apply(&reader)?;

    let events = reader.events();
    let monitor = manager.monitor(Arc::clone(&reader));
    reader.enable_detection(&monitor)?;

    loop {
        match events.recv_timeout(timeout)? {
            ReaderEvent::CardInserted { .. } => break,
            ReaderEvent::CardRemoved { .. } => {}
        }
    }
    info!(card = %reader.card_description(), "Card ready");

    reader.open()?;
    let result = commands.iter().try_for_each(|command| {
        println!("> {}", hex::encode_upper(command));
        let response = reader.transmit(command)?;
        println!("< {}", hex::encode_upper(&response));
        Ok::<_, eyre::Report>(())
    });
    reader.close()?;
    reader.disable_detection(&monitor)?;

    result
}
