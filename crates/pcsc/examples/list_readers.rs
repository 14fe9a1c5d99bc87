//! Example showing how to enumerate connected card readers and the
//! transmission protocols their cards offer

use nexum_apdu_transport_pcsc::{PcscDeviceManager, atr};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manager = PcscDeviceManager::new()?;
    let readers = manager.list_readers()?;

    println!("Found {} readers:", readers.len());

    for (i, reader) in readers.iter().enumerate() {
        println!("{}. Reader: {}", i + 1, reader.name());

        match reader.atr() {
            Some(atr) if reader.has_card() => {
                let protocols = atr::protocols(atr)
                    .iter()
                    .map(|t| format!("T={t}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("   Card present, ATR: {} ({protocols})", hex::encode_upper(atr));
            }
            _ => println!("   No card present"),
        }
    }

    Ok(())
}
