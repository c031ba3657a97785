use std::env;
use std::fs::File;

use ctrkit::crypto::cbc::{CbcStream, CipherParams};
use ctrkit::formats::ivfc::IvfcStream;
use ctrkit::keys::KeySet;
use ctrkit::stream::shared;
use ctrkit::stream::sub::SubStream;
use ctrkit::Result;

const USAGE: &str = "usage: romfs <romfs.bin> | <content> <keys> <title id> <index> <offset> <size>";

/// Verify every data block of a RomFS image.
///
/// ```text
/// romfs <romfs.bin>
/// romfs <content.bin> <keys.txt> <title id hex> <content index> <romfs offset> <romfs size>
/// ```
fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(path) = args.first() else {
        eprintln!("{USAGE}");
        return Ok(());
    };
    let file = shared(File::open(path)?);

    let mut romfs = match args.len() {
        1 => IvfcStream::open(file)?,
        6 => {
            let mut keys = KeySet::new();
            keys.load(File::open(&args[1])?)?;
            let (Ok(title_id), Ok(index), Ok(offset), Ok(size)) = (
                u64::from_str_radix(&args[2], 16),
                args[3].parse::<u16>(),
                args[4].parse::<u64>(),
                args[5].parse::<u64>(),
            ) else {
                eprintln!("{USAGE}");
                return Ok(());
            };

            let Some(&title_key) = keys.title_keys.get(&title_id) else {
                eprintln!("no title key for {title_id:016X}");
                return Ok(());
            };
            let plain = CbcStream::open(file, &CipherParams::for_cia_content(title_key, index))?;
            let region = SubStream::new(shared(plain), offset, size)?;
            IvfcStream::open(shared(region))?
        }
        _ => {
            eprintln!("{USAGE}");
            return Ok(());
        }
    };

    let mut buf = vec![0u8; 1 << 20];
    let mut total = 0u64;
    loop {
        let n = romfs.read(&mut buf)?;
        if n == 0 {
            break;
        }
        total += n as u64;
    }

    println!(
        "verified {total:#x} bytes in {} blocks",
        romfs.processor().blocks_verified()
    );
    Ok(())
}
