// Sounding Rocket Program
//
// CSV row formatting shared between the autosave task and the final flush.
// Uses the `csv` crate so fields containing commas (the bracketed triple
// readings) are quoted automatically, matching the literal format the
// original Python `csv` module produces.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::Error;
use crate::ring::Sample;

/// Open `path` in append mode (creating it if it does not exist yet), write
/// `header` as a single-field comment row, then one 3-field data row per
/// sample in `samples`, then `trailer` as a single-field comment row, and
/// flush. Each call opens and closes the file so that a sudden power loss
/// never loses more than the in-flight call's rows.
pub fn append_autosave_block(
    path: &Path,
    header: &str,
    samples: &[Sample],
    trailer: &str,
) -> Result<(), Error> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

    writer.write_record([header])?;
    for sample in samples {
        writer.write_record([
            sample.serial.to_string(),
            format!("{:.6}", sample.timestamp),
            sample.reading.to_csv_field(),
        ])?;
    }
    writer.write_record([trailer])?;
    writer.flush()?;
    Ok(())
}
