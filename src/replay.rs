//! Recorded detection dumps: one `<offset_ms>: <json array>` line per frame.

use crate::detection::Detection;
use crate::error::Error;
use crate::frame::Frame;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Splits one dump line into its millisecond offset and detections.
pub fn parse_line(line: &str, lineno: usize) -> Result<(u64, Vec<Detection>), Error> {
    let Some(idx) = line.find(':') else {
        return Err(Error::Dump {
            line: lineno,
            reason: "expected `:`".into(),
        });
    };

    let (ts, vector) = line.split_at(idx);

    let ts = ts.trim().parse::<u64>().map_err(|err| Error::Dump {
        line: lineno,
        reason: format!("bad timestamp: {}", err),
    })?;

    let detections = serde_json::from_str(vector[1..].trim()).map_err(|err| Error::Dump {
        line: lineno,
        reason: format!("bad detections: {}", err),
    })?;

    Ok((ts, detections))
}

/// Iterates the frames of a dump. Blank lines are skipped; frames are
/// numbered from 1 in file order.
pub struct DumpReader<R> {
    lines: std::io::Lines<R>,
    dims: (u32, u32),
    lineno: usize,
    index: u64,
}

impl<R: BufRead> DumpReader<R> {
    pub fn new(reader: R, dims: (u32, u32)) -> Self {
        Self {
            lines: reader.lines(),
            dims,
            lineno: 0,
            index: 0,
        }
    }
}

impl DumpReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P, dims: (u32, u32)) -> Result<Self, Error> {
        let file = File::open(path)?;

        Ok(Self::new(BufReader::new(file), dims))
    }
}

impl<R: BufRead> Iterator for DumpReader<R> {
    type Item = Result<Frame, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(err.into())),
            };
            self.lineno += 1;

            if line.trim().is_empty() {
                continue;
            }

            return Some(parse_line(&line, self.lineno).map(|(ms, detections)| {
                self.index += 1;
                Frame::new(self.index, ms as f32 / 1000.0, self.dims, detections)
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"0: [{"l":10,"t":10,"r":50,"b":90,"p":0.9,"c":0}]

100: []
200: [{"l":12,"t":10,"r":52,"b":90,"p":0.8,"c":0},{"l":300,"t":40,"r":380,"b":120,"p":0.7,"c":2}]
"#;

    #[test]
    fn reads_frames_in_order() {
        let frames: Vec<Frame> = DumpReader::new(DUMP.as_bytes(), (640, 480))
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1].index, 2);
        assert!(frames[1].is_empty());
        assert!((frames[2].timestamp - 0.2).abs() < 1e-6);
        assert_eq!(frames[2].detections[1].class, 2);
        assert_eq!(frames[2].dims, (640, 480));
    }

    #[test]
    fn reports_the_bad_line() {
        let dump = "0: []\n\nabc: []\n";
        let res: Result<Vec<Frame>, _> = DumpReader::new(dump.as_bytes(), (640, 480)).collect();

        match res {
            Err(Error::Dump { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected {:?}", other.map(|f| f.len())),
        }
    }

    #[test]
    fn rejects_missing_separator_and_bad_json() {
        assert!(matches!(parse_line("100 []", 1), Err(Error::Dump { line: 1, .. })));
        assert!(matches!(parse_line("100: [{", 7), Err(Error::Dump { line: 7, .. })));
    }
}
