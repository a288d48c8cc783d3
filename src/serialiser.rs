use crate::cue::BilingualCue;

use std::io::{BufWriter, Write};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use clap::ValueEnum;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Aligned rows as a WebVTT file, primary line above secondary.
    Vtt,
    /// Readable transcript with timestamps and markup removed.
    Text,
}

/// Writes `cues` in `format`. Rows listed in `bookmarked` are starred in
/// the text transcript.
pub fn serialise<W: Write>(
    cues: &[BilingualCue],
    format: Format,
    with_secondary: bool,
    bookmarked: &[usize],
    output: W,
) -> Result<()> {
    let mut writer = BufWriter::new(output);
    match format {
        Format::Vtt => write_vtt(&mut writer, cues, with_secondary),
        Format::Text => write_text(&mut writer, cues, with_secondary, bookmarked),
    }
    .context("Failed to write transcript.")?;
    writer.flush().context("Failed to write transcript.")?;
    Ok(())
}

fn write_vtt<W: Write>(buf: &mut W, cues: &[BilingualCue], with_secondary: bool) -> Result<()> {
    writeln!(buf, "WEBVTT")?;
    writeln!(buf)?;
    for cue in cues {
        writeln!(buf, "{}", cue.index + 1)?;
        write_ts(buf, cue.start)?;
        write!(buf, " --> ")?;
        write_ts(buf, cue.end)?;
        writeln!(buf)?;
        writeln!(buf, "{}", cue.primary)?;
        // A blank line would end the cue, so orphan separators are dropped.
        if with_secondary {
            for line in cue.secondary.lines().filter(|l| !l.trim().is_empty()) {
                writeln!(buf, "{}", line)?;
            }
        }
        writeln!(buf)?;
    }
    Ok(())
}

fn write_text<W: Write>(
    buf: &mut W,
    cues: &[BilingualCue],
    with_secondary: bool,
    bookmarked: &[usize],
) -> Result<()> {
    for cue in cues {
        let mark = if bookmarked.contains(&cue.index) { "*" } else { "" };
        write!(buf, "[")?;
        write_ts(buf, cue.start)?;
        writeln!(buf, "]{} {}", mark, strip_markup(&cue.primary).replace('\n', " "))?;
        if with_secondary {
            for line in cue.secondary.lines().filter(|l| !l.trim().is_empty()) {
                writeln!(buf, "               {}", strip_markup(line))?;
            }
        }
    }
    Ok(())
}

fn strip_markup(text: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let tags = TAGS.get_or_init(|| Regex::new(r"</?[A-Za-z][^>]*>").expect("valid tag pattern"));
    tags.replace_all(text, "").into_owned()
}

/// `HH:MM:SS.mmm` for display.
pub fn timestamp(seconds: f64) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_ts(&mut buf, seconds);
    String::from_utf8_lossy(&buf).into_owned()
}

fn write_ts<W: Write>(buf: &mut W, seconds: f64) -> Result<()> {
    let total_millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let total_secs = total_millis / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = total_millis % 1000;
    write!(
        buf,
        "{:02}:{:02}:{:02}.{:03}",
        hours, minutes, seconds, millis
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use std::io::Cursor;

    macro_rules! test_write_ts {
        ($($name:ident: $value:expr,)*) => {
        $(
            #[test]
            fn $name() {
                let (input, expected) = $value;

                let mut buf = Cursor::new(vec![]);

                write_ts(&mut buf, input).expect("Failed to write to buffer");

                assert_eq!(String::from_utf8(buf.into_inner()).unwrap(), expected);
            }
        )*
        }
    }

    test_write_ts! {
        test_write_ts_0: (0.0, "00:00:00.000"),
        test_write_ts_1: (0.001, "00:00:00.001"),
        test_write_ts_2: (0.999, "00:00:00.999"),
        test_write_ts_3: (1.0, "00:00:01.000"),
        test_write_ts_4: (59.999, "00:00:59.999"),
        test_write_ts_5: (60.0, "00:01:00.000"),
        test_write_ts_6: (3_600.0, "01:00:00.000"),
        test_write_ts_7: (7_326.159, "02:02:06.159"),
        test_write_ts_8: (360_000.001, "100:00:00.001"),
        test_write_ts_9: (-2.0, "00:00:00.000"),
    }

    fn rows() -> Vec<BilingualCue> {
        vec![
            BilingualCue {
                index: 0,
                primary: "<i>Hi</i>".into(),
                secondary: "سلام\nدوباره".into(),
                start: 0.0,
                end: 2.0,
            },
            BilingualCue {
                index: 1,
                primary: "Bye".into(),
                secondary: "\norphan".into(),
                start: 2.0,
                end: 4.5,
            },
        ]
    }

    #[test]
    fn vtt_export_parses_back() {
        let mut out = Vec::new();
        serialise(&rows(), Format::Vtt, true, &[1], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("WEBVTT\n\n1\n00:00:00.000 --> 00:00:02.000\n"));

        let cues = Parser::strict().parse(&text).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "<i>Hi</i>\nسلام\nدوباره");
        assert_eq!(cues[1].text, "Bye\norphan");
        assert_eq!(cues[1].end, 4.5);
    }

    #[test]
    fn text_export_strips_markup_and_can_hide_secondary() {
        let mut out = Vec::new();
        serialise(&rows(), Format::Text, false, &[], &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[00:00:00.000] Hi\n[00:00:02.000] Bye\n"
        );
    }

    #[test]
    fn text_export_stars_bookmarked_rows() {
        let mut out = Vec::new();
        serialise(&rows(), Format::Text, true, &[1], &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[00:00:00.000] Hi\n               سلام\n               دوباره\n[00:00:02.000]* Bye\n               orphan\n"
        );
    }
}
