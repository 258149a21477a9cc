//! Delimited text point recordings
//!
//! A recording holds one sensor return per line:
//! - Auto-detection of delimiters (comma, space, tab, semicolon)
//! - Optional header naming the columns; aliases are accepted
//! - x, y, z and timestamp are required, reflectivity is optional
//! - Timestamps are integer nanoseconds on the sensor clock
//! - Lines starting with `#` are comments
//!
//! Headerless files are read as `x y z reflectivity timestamp`.

use lbad_core::{Error, Point3f, Result, ScanPoint};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// Supported delimiters for point recordings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Space,
    Tab,
    Semicolon,
}

impl Delimiter {
    pub fn as_char(&self) -> char {
        match self {
            Delimiter::Comma => ',',
            Delimiter::Space => ' ',
            Delimiter::Tab => '\t',
            Delimiter::Semicolon => ';',
        }
    }

    /// Pick the most frequent delimiter on a line.
    ///
    /// On a tie a separator character beats whitespace, so `1, 2, 3` is
    /// comma-separated.
    pub fn detect_from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        // max_by_key keeps the last maximum
        [
            (line.matches(' ').count(), Delimiter::Space),
            (line.matches('\t').count(), Delimiter::Tab),
            (line.matches(';').count(), Delimiter::Semicolon),
            (line.matches(',').count(), Delimiter::Comma),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .max_by_key(|(count, _)| *count)
        .map(|(_, delimiter)| delimiter)
    }

    /// Split a line into trimmed fields
    fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match self {
            // Whitespace-aligned columns may use runs of separators
            Delimiter::Space | Delimiter::Tab => line.split_whitespace().collect(),
            _ => line.split(self.as_char()).map(str::trim).collect(),
        }
    }
}

/// Column types that can appear in a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    X,
    Y,
    Z,
    Reflectivity,
    Timestamp,
    Unknown,
}

impl ColumnType {
    /// Parse column type from header name
    pub fn from_header(header: &str) -> Self {
        match header.trim().to_lowercase().as_str() {
            "x" | "px" | "pos_x" => ColumnType::X,
            "y" | "py" | "pos_y" => ColumnType::Y,
            "z" | "pz" | "pos_z" => ColumnType::Z,
            "reflectivity" | "r" | "intensity" | "i" => ColumnType::Reflectivity,
            "timestamp" | "t" | "time" | "timestamp_ns" => ColumnType::Timestamp,
            _ => ColumnType::Unknown,
        }
    }

    pub fn header_name(&self) -> &'static str {
        match self {
            ColumnType::X => "x",
            ColumnType::Y => "y",
            ColumnType::Z => "z",
            ColumnType::Reflectivity => "reflectivity",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Unknown => "unknown",
        }
    }
}

/// Column layout of a recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointFileSchema {
    pub columns: Vec<ColumnType>,
    pub has_header: bool,
    pub delimiter: Delimiter,
}

/// Resolved column positions
#[derive(Debug, Clone, Copy)]
struct ColumnIndices {
    x: usize,
    y: usize,
    z: usize,
    reflectivity: Option<usize>,
    timestamp: usize,
}

impl PointFileSchema {
    pub fn new(columns: Vec<ColumnType>, has_header: bool, delimiter: Delimiter) -> Self {
        Self {
            columns,
            has_header,
            delimiter,
        }
    }

    /// The layout assumed for headerless recordings
    pub fn headerless(delimiter: Delimiter) -> Self {
        Self::new(
            vec![
                ColumnType::X,
                ColumnType::Y,
                ColumnType::Z,
                ColumnType::Reflectivity,
                ColumnType::Timestamp,
            ],
            false,
            delimiter,
        )
    }

    /// Detect the schema from the first content line of a recording
    pub fn detect_from_line(line: &str) -> Result<Self> {
        let delimiter = Delimiter::detect_from_line(line)
            .ok_or_else(|| Error::InvalidData("Could not detect delimiter".to_string()))?;

        let fields = delimiter.split(line);
        let is_header = fields.iter().any(|f| f.parse::<f64>().is_err());

        let schema = if is_header {
            let columns = fields.iter().map(|f| ColumnType::from_header(f)).collect();
            Self::new(columns, true, delimiter)
        } else {
            Self::headerless(delimiter)
        };
        schema.indices()?;
        Ok(schema)
    }

    fn indices(&self) -> Result<ColumnIndices> {
        let find = |column: ColumnType| self.columns.iter().position(|c| *c == column);
        let require = |column: ColumnType| {
            find(column).ok_or_else(|| {
                Error::InvalidData(format!(
                    "Recording must contain a '{}' column",
                    column.header_name()
                ))
            })
        };
        Ok(ColumnIndices {
            x: require(ColumnType::X)?,
            y: require(ColumnType::Y)?,
            z: require(ColumnType::Z)?,
            reflectivity: find(ColumnType::Reflectivity),
            timestamp: require(ColumnType::Timestamp)?,
        })
    }

    /// Header line for this schema
    pub fn header_line(&self) -> String {
        self.columns
            .iter()
            .map(ColumnType::header_name)
            .collect::<Vec<_>>()
            .join(&self.delimiter.as_char().to_string())
    }
}

/// Parse one data line
fn parse_line(line: &str, delimiter: Delimiter, indices: &ColumnIndices) -> Result<ScanPoint> {
    let fields = delimiter.split(line);
    let field = |index: usize, name: &str| {
        fields
            .get(index)
            .copied()
            .ok_or_else(|| Error::InvalidData(format!("Missing {} column", name)))
    };
    let coordinate = |index: usize, name: &str| -> Result<f32> {
        field(index, name)?
            .parse::<f32>()
            .map_err(|_| Error::InvalidData(format!("Invalid {} coordinate", name)))
    };

    let x = coordinate(indices.x, "x")?;
    let y = coordinate(indices.y, "y")?;
    let z = coordinate(indices.z, "z")?;

    let reflectivity = match indices.reflectivity {
        Some(index) => field(index, "reflectivity")?
            .parse::<f32>()
            .map_err(|_| Error::InvalidData("Invalid reflectivity".to_string()))?,
        None => 0.0,
    };

    let nanos = field(indices.timestamp, "timestamp")?
        .parse::<u64>()
        .map_err(|_| Error::InvalidData("Invalid timestamp (expected integer nanoseconds)".to_string()))?;

    Ok(ScanPoint::new(
        Point3f::new(x, y, z),
        reflectivity,
        Duration::from_nanos(nanos),
    ))
}

fn is_content(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

/// Streaming reader over a point recording.
///
/// Yields one `Result` per data line; a bad line does not end the stream.
pub struct PointFileReader<R: BufRead> {
    reader: R,
    schema: PointFileSchema,
    indices: ColumnIndices,
    pending: Option<String>,
    line_number: usize,
}

impl PointFileReader<BufReader<File>> {
    /// Open a recording, detecting its schema from the first content line
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::with_capacity(64 * 1024, file))
    }
}

impl<R: BufRead> PointFileReader<R> {
    /// Wrap any buffered reader
    pub fn from_reader(mut reader: R) -> Result<Self> {
        let mut line_number = 0;
        let line = loop {
            let Some(line) = read_text_line(&mut reader, &mut line_number)? else {
                return Err(Error::InvalidData("Recording contains no points".to_string()));
            };
            if is_content(&line) {
                break line;
            }
        };

        let schema = PointFileSchema::detect_from_line(line.trim())?;
        let indices = schema.indices()?;
        let pending = if schema.has_header { None } else { Some(line) };

        Ok(Self {
            reader,
            schema,
            indices,
            pending,
            line_number,
        })
    }

    pub fn schema(&self) -> &PointFileSchema {
        &self.schema
    }

    /// Line number of the most recently read line
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        while let Some(line) = read_text_line(&mut self.reader, &mut self.line_number)? {
            if is_content(&line) {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }
}

/// Read one line as text, counting it in `line_number`.
///
/// A line that is not valid UTF-8 is consumed and reported as
/// [`Error::InvalidData`], so the caller can skip it and keep reading.
fn read_text_line<R: BufRead>(reader: &mut R, line_number: &mut usize) -> Result<Option<String>> {
    let mut bytes = Vec::new();
    if reader.read_until(b'\n', &mut bytes)? == 0 {
        return Ok(None);
    }
    *line_number += 1;
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|_| Error::InvalidData(format!("line {}: invalid UTF-8", line_number)))
}

impl<R: BufRead> Iterator for PointFileReader<R> {
    type Item = Result<ScanPoint>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_line() {
            Ok(Some(line)) => Some(
                parse_line(line.trim(), self.schema.delimiter, &self.indices).map_err(|e| match e {
                    Error::InvalidData(msg) => {
                        Error::InvalidData(format!("line {}: {}", self.line_number, msg))
                    }
                    other => other,
                }),
            ),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Writes point recordings readable by [`PointFileReader`]
pub struct PointFileWriter<W: Write> {
    writer: W,
    delimiter: Delimiter,
}

impl PointFileWriter<BufWriter<File>> {
    /// Create a recording with a header line
    pub fn create<P: AsRef<Path>>(path: P, delimiter: Delimiter) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), delimiter)
    }
}

impl<W: Write> PointFileWriter<W> {
    pub fn new(mut writer: W, delimiter: Delimiter) -> Result<Self> {
        let mut schema = PointFileSchema::headerless(delimiter);
        schema.has_header = true;
        writeln!(writer, "{}", schema.header_line())?;
        Ok(Self { writer, delimiter })
    }

    pub fn write_point(&mut self, point: &ScanPoint) -> Result<()> {
        let d = self.delimiter.as_char();
        writeln!(
            self.writer,
            "{}{d}{}{d}{}{d}{}{d}{}",
            point.position.x,
            point.position.y,
            point.position.z,
            point.reflectivity,
            point.timestamp.as_nanos(),
        )?;
        Ok(())
    }

    pub fn write_points<'a, I>(&mut self, points: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a ScanPoint>,
    {
        for point in points {
            self.write_point(point)?;
        }
        Ok(())
    }

    /// Flush and return the underlying writer
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Write a whole recording to `path`
pub fn write_recording<P: AsRef<Path>>(path: P, points: &[ScanPoint]) -> Result<()> {
    let mut writer = PointFileWriter::create(path, Delimiter::Comma)?;
    writer.write_points(points)?;
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(content: &str) -> Vec<Result<ScanPoint>> {
        PointFileReader::from_reader(Cursor::new(content.to_string()))
            .unwrap()
            .collect()
    }

    #[test]
    fn test_delimiter_detection() {
        assert_eq!(Delimiter::detect_from_line("1,2,3"), Some(Delimiter::Comma));
        assert_eq!(Delimiter::detect_from_line("1 2 3"), Some(Delimiter::Space));
        assert_eq!(Delimiter::detect_from_line("1\t2\t3"), Some(Delimiter::Tab));
        assert_eq!(Delimiter::detect_from_line("1;2;3"), Some(Delimiter::Semicolon));
        assert_eq!(Delimiter::detect_from_line("123"), None);
        assert_eq!(
            Delimiter::detect_from_line("x, y, z, reflectivity, timestamp"),
            Some(Delimiter::Comma)
        );
        assert_eq!(Delimiter::detect_from_line("1; 2; 3"), Some(Delimiter::Semicolon));
    }

    #[test]
    fn test_comma_space_separated_recording() {
        let content = "x, y, z, reflectivity, timestamp\n1.0, 2.0, 3.0, 10, 1000\n";
        let reader = PointFileReader::from_reader(Cursor::new(content)).unwrap();
        assert_eq!(reader.schema().delimiter, Delimiter::Comma);
        assert!(reader.schema().has_header);

        let points: Vec<ScanPoint> = reader.map(|p| p.unwrap()).collect();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].position, Point3f::new(1.0, 2.0, 3.0));
        assert_eq!(points[0].reflectivity, 10.0);
        assert_eq!(points[0].timestamp, Duration::from_micros(1));
    }

    #[test]
    fn test_invalid_utf8_line_is_skippable() {
        let mut content = b"x,y,z,reflectivity,timestamp\n1,2,3,4,5\n".to_vec();
        content.extend_from_slice(b"1,2,\xff\xfe,4,6\n");
        content.extend_from_slice(b"7,8,9,10,11\n");

        let results: Vec<Result<ScanPoint>> =
            PointFileReader::from_reader(Cursor::new(content)).unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(Error::InvalidData(msg)) => assert!(msg.contains("line 3"), "unexpected error: {}", msg),
            other => panic!("expected invalid data, got {:?}", other),
        }
        assert_eq!(results[2].as_ref().unwrap().position.x, 7.0);
    }

    #[test]
    fn test_header_with_aliases() {
        let content = "# recorded on bench\ntime,px,py,pz,intensity\n1000000,1.0,2.0,3.0,42\n";
        let points = read_all(content);
        assert_eq!(points.len(), 1);
        let p = points[0].as_ref().unwrap();
        assert_eq!(p.position, Point3f::new(1.0, 2.0, 3.0));
        assert_eq!(p.reflectivity, 42.0);
        assert_eq!(p.timestamp, Duration::from_millis(1));
    }

    #[test]
    fn test_headerless_space_separated() {
        let content = "0.5  1.5 2.5 10 500\n\n0.0 0.0 0.0 20 1000\n";
        let points: Vec<ScanPoint> = read_all(content).into_iter().map(|p| p.unwrap()).collect();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].position, Point3f::new(0.5, 1.5, 2.5));
        assert_eq!(points[0].timestamp, Duration::from_nanos(500));
        assert_eq!(points[1].reflectivity, 20.0);
    }

    #[test]
    fn test_missing_reflectivity_defaults_to_zero() {
        let content = "x;y;z;timestamp\n1;2;3;7\n";
        let p = read_all(content).remove(0).unwrap();
        assert_eq!(p.reflectivity, 0.0);
        assert_eq!(p.timestamp, Duration::from_nanos(7));
    }

    #[test]
    fn test_bad_lines_do_not_end_stream() {
        let content = "x,y,z,reflectivity,timestamp\n1,2,3,4,5\n1,oops,3,4,6\n1,2,3,4\n7,8,9,10,11\n";
        let results = read_all(content);
        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err().to_string();
        assert!(err.contains("line 3"), "unexpected error: {}", err);
        assert!(results[2].is_err());
        assert_eq!(results[3].as_ref().unwrap().position.x, 7.0);
    }

    #[test]
    fn test_non_finite_coordinates_parse() {
        let content = "x,y,z,reflectivity,timestamp\nNaN,0,inf,1,2\n";
        let p = read_all(content).remove(0).unwrap();
        assert!(!p.is_finite());
    }

    #[test]
    fn test_schema_requires_timestamp() {
        let content = "x,y,z\n1,2,3\n";
        assert!(PointFileReader::from_reader(Cursor::new(content)).is_err());
        assert!(PointFileReader::from_reader(Cursor::new("")).is_err());
    }

    #[test]
    fn test_writer_output_is_readable() {
        let points = vec![
            ScanPoint::from_xyz(1.0, 2.0, 3.0, 4.0, 5),
            ScanPoint::from_xyz(-1.5, 0.25, 8.0, 0.0, 6),
        ];
        let mut writer = PointFileWriter::new(Vec::new(), Delimiter::Tab).unwrap();
        writer.write_points(&points).unwrap();
        let bytes = writer.finish().unwrap();

        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("x\ty\tz\treflectivity\ttimestamp\n"));
        let read: Vec<ScanPoint> = read_all(&text).into_iter().map(|p| p.unwrap()).collect();
        assert_eq!(read, points);
    }
}
