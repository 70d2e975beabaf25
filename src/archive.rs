//! Conversion between JARs and pack200 archives

use crate::errors::{Error, FormatError};
use crate::segment::{Segment, SegmentBuilder, SegmentFile};
use crate::settings::{PackSettings, UnpackSettings};
use chrono::{Datelike, NaiveDate, TimeZone, Timelike, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{BufRead, BufReader, Cursor, Read, Seek, Write};
use std::mem;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Pack a JAR into a pack200 archive
///
/// Entries are split into segments of roughly `settings.segment_limit` input bytes, and each
/// segment is written out as soon as it is full.
pub fn pack<R: Read + Seek, W: Write>(
    jar: R,
    output: W,
    settings: &PackSettings,
) -> Result<(), Error> {
    let mut archive = ZipArchive::new(jar)?;
    log::info!("Packing {} JAR entries", archive.len());
    let segments = if settings.gzip {
        let mut encoder = GzEncoder::new(output, Compression::best());
        let segments = pack_segments(&mut archive, &mut encoder, settings)?;
        encoder.finish()?;
        segments
    } else {
        let mut output = output;
        let segments = pack_segments(&mut archive, &mut output, settings)?;
        output.flush()?;
        segments
    };
    log::info!("Packed into {} segments", segments);
    Ok(())
}

fn pack_segments<R: Read + Seek, W: Write>(
    archive: &mut ZipArchive<R>,
    output: &mut W,
    settings: &PackSettings,
) -> Result<usize, Error> {
    let mut builder = SegmentBuilder::new(settings);
    let mut segments = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_owned();
        let modtime = unix_seconds(entry.last_modified());
        let deflate = entry.compression() != CompressionMethod::Stored;
        let mut contents = vec![];
        entry.read_to_end(&mut contents)?;
        log::trace!("Read entry {} ({} bytes)", name, contents.len());

        if let Some(limit) = settings.segment_limit {
            let size = name.len() + contents.len();
            if !builder.is_empty() && builder.input_size() + size > limit {
                let full = mem::replace(&mut builder, SegmentBuilder::new(settings));
                full.finish()?.write(output)?;
                segments += 1;
            }
        }
        builder.add_file(&name, contents, modtime, deflate)?;
    }

    if !builder.is_empty() || segments == 0 {
        builder.finish()?.write(output)?;
        segments += 1;
    }
    Ok(segments)
}

/// Unpack a pack200 archive (possibly gzipped) into a JAR
///
/// Segments are decoded one at a time, and the files of each segment are written out before the
/// next segment is read.
pub fn unpack<R: Read, W: Write + Seek>(
    input: R,
    jar: W,
    settings: &UnpackSettings,
) -> Result<(), Error> {
    let mut input = BufReader::new(input);
    let mut jar = ZipWriter::new(jar);
    let segments = if input.fill_buf()?.starts_with(&GZIP_MAGIC) {
        log::debug!("Input is gzipped");
        let mut decoder = BufReader::new(GzDecoder::new(input));
        unpack_segments(&mut decoder, &mut jar, settings)?
    } else {
        unpack_segments(&mut input, &mut jar, settings)?
    };
    jar.finish()?;
    log::info!("Unpacked {} segments", segments);
    Ok(())
}

fn unpack_segments<R: BufRead, W: Write + Seek>(
    input: &mut R,
    jar: &mut ZipWriter<W>,
    settings: &UnpackSettings,
) -> Result<usize, Error> {
    let mut segments = 0;
    while !input.fill_buf()?.is_empty() {
        let segment = Segment::read(&mut *input)?;
        for file in &segment.files {
            write_entry(jar, &segment, file, settings)?;
        }
        segments += 1;
    }
    if segments == 0 {
        return Err(Error::Format(FormatError::UnexpectedEof {
            band: "archive_magic".to_owned(),
        }));
    }
    Ok(segments)
}

fn write_entry<W: Write + Seek>(
    jar: &mut ZipWriter<W>,
    segment: &Segment,
    file: &SegmentFile,
    settings: &UnpackSettings,
) -> Result<(), Error> {
    let method = if settings.deflate_hint.apply(file.deflate) {
        CompressionMethod::Deflated
    } else {
        CompressionMethod::Stored
    };
    let options = FileOptions::default()
        .compression_method(method)
        .last_modified_time(dos_time(file.modtime));

    if file.is_directory() {
        jar.add_directory(file.name.as_str(), options)?;
    } else {
        let contents = segment.contents(file)?;
        log::trace!("Writing entry {} ({} bytes)", file.name, contents.len());
        jar.start_file(file.name.as_str(), options)?;
        jar.write_all(&contents)?;
    }
    Ok(())
}

/// Pack then unpack a JAR, which normalizes its class files
pub fn repack<R: Read + Seek, W: Write + Seek>(
    jar: R,
    output: W,
    pack_settings: &PackSettings,
    unpack_settings: &UnpackSettings,
) -> Result<(), Error> {
    let mut packed = vec![];
    pack(jar, &mut packed, pack_settings)?;
    unpack(Cursor::new(packed), output, unpack_settings)
}

/// Seconds since the Unix epoch of a JAR timestamp, read as UTC
fn unix_seconds(time: DateTime) -> u32 {
    let seconds = NaiveDate::from_ymd_opt(time.year() as i32, time.month() as u32, time.day() as u32)
        .and_then(|date| {
            date.and_hms_opt(time.hour() as u32, time.minute() as u32, time.second() as u32)
        })
        .map_or(0, |naive| Utc.from_utc_datetime(&naive).timestamp());
    seconds.clamp(0, u32::MAX as i64) as u32
}

/// JAR timestamp of seconds since the Unix epoch, in UTC
///
/// Times before 1980 (the first year JAR timestamps can express) become 1980-01-01.
fn dos_time(seconds: u32) -> DateTime {
    Utc.timestamp_opt(seconds as i64, 0)
        .single()
        .and_then(|time| {
            DateTime::from_date_and_time(
                u16::try_from(time.year()).ok()?,
                time.month() as u8,
                time.day() as u8,
                time.hour() as u8,
                time.minute() as u8,
                time.second() as u8,
            )
            .ok()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn leap_days() {
        // 2000-02-29 00:00:00 UTC
        let time = DateTime::from_date_and_time(2000, 2, 29, 0, 0, 0).unwrap();
        assert_eq!(unix_seconds(time), 951_782_400);
        let back = dos_time(951_782_400 + 86_399);
        assert_eq!((back.month(), back.day(), back.hour()), (2, 29, 23));
    }

    #[test]
    fn jar_timestamps() {
        // 2021-06-15 13:45:30 UTC
        let time = DateTime::from_date_and_time(2021, 6, 15, 13, 45, 30).unwrap();
        let seconds = unix_seconds(time);
        assert_eq!(seconds, 1_623_764_730);

        let back = dos_time(seconds);
        assert_eq!(
            (back.year(), back.month(), back.day()),
            (2021, 6, 15)
        );
        assert_eq!((back.hour(), back.minute(), back.second()), (13, 45, 30));

        let before_jars = dos_time(0);
        assert_eq!(before_jars.year(), 1980);
    }
}
