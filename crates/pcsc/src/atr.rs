//! Transmission protocol detection from the answer-to-reset
//!
//! T0 carries the TA1/TB1/TC1/TD1 presence bits in its high nibble. Each TDi
//! names a protocol in its low nibble and the presence of the next interface
//! group in its high nibble. An ATR without any TDi implies T=0.

use nexum_apdu_reader::tech;

const TA: u8 = 0x1;
const TB: u8 = 0x2;
const TC: u8 = 0x4;
const TD: u8 = 0x8;

/// Protocol numbers (`T=n`) offered by an ATR, in order of appearance
pub fn protocols(atr: &[u8]) -> Vec<u8> {
    let Some(&t0) = atr.get(1) else {
        return Vec::new();
    };

    let mut protocols = Vec::new();
    let mut presence = t0 >> 4;
    let mut index = 2;
    loop {
        index += [TA, TB, TC]
            .iter()
            .filter(|bit| presence & **bit != 0)
            .count();
        if presence & TD == 0 {
            break;
        }
        let Some(&td) = atr.get(index) else {
            break;
        };
        index += 1;

        let protocol = td & 0x0F;
        // T=15 only carries global interface bytes
        if protocol != 0x0F && !protocols.contains(&protocol) {
            protocols.push(protocol);
        }
        presence = td >> 4;
    }

    if protocols.is_empty() {
        protocols.push(0);
    }
    protocols
}

/// Technology selectors a contact card with this ATR can be driven through
///
/// Always includes the generic ISO/IEC 7816-3 selector, followed by the
/// specific T=0 and T=1 selectors the ATR offers.
pub fn technologies(atr: &[u8]) -> Vec<String> {
    let mut technologies = vec![tech::ISO_7816_3.to_string()];
    if atr.len() < 2 {
        return technologies;
    }
    for protocol in protocols(atr) {
        match protocol {
            0 => technologies.push(tech::ISO_7816_3_T0.to_string()),
            1 => technologies.push(tech::ISO_7816_3_T1.to_string()),
            _ => {}
        }
    }
    technologies
}
