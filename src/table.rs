//! CSV input and output for the fragmentation and pairing stages.

use crate::config::{PairingOptions, TableOptions};
use crate::error::{MmpError, Result};
use crate::fragment::FragmentationRecord;
use crate::pairing::Transform;
use csv::{Reader, ReaderBuilder, StringRecord, Writer};
use std::io::{Read, Write};
use tracing::*;

/// One row of the input table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRow {
    pub row_id: String,
    pub smiles: String,
    pub id: Option<String>,
    /// Every original cell, in column order.
    pub fields: Vec<String>,
}

fn column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|header| header.trim() == name)
}

/// Reads molecule rows, locating the SMILES and ID columns by name.
pub struct InputReader<R> {
    reader: Reader<R>,
    headers: StringRecord,
    smiles_column: usize,
    id_column: Option<usize>,
}

impl<R: Read> InputReader<R> {
    pub fn new(input: R, options: &TableOptions) -> Result<Self> {
        let mut reader = ReaderBuilder::new().has_headers(true).flexible(true).from_reader(input);
        let headers = reader.headers()?.clone();
        let smiles_column = column(&headers, &options.smiles_column).ok_or_else(|| {
            MmpError::InvalidConfiguration(format!(
                "input has no '{}' column",
                options.smiles_column
            ))
        })?;
        let id_column = column(&headers, &options.id_column);
        if id_column.is_none() {
            warn!("Input has no '{}' column, rows have no ID", options.id_column);
        }
        Ok(Self {
            reader,
            headers,
            smiles_column,
            id_column,
        })
    }

    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    /// Rows in file order, with IDs `Row0`, `Row1`, ...
    pub fn rows(self) -> impl Iterator<Item = Result<InputRow>> {
        let smiles_column = self.smiles_column;
        let id_column = self.id_column;
        self.reader
            .into_records()
            .enumerate()
            .map(move |(n, record)| {
                let record = record?;
                let cell = |index: usize| record.get(index).unwrap_or("").trim().to_string();
                let id = id_column.map(cell).filter(|id| !id.is_empty());
                Ok(InputRow {
                    row_id: format!("Row{n}"),
                    smiles: cell(smiles_column),
                    id,
                    fields: record.iter().map(str::to_string).collect(),
                })
            })
    }
}

pub const FRAGMENT_HEADERS: [&str; 6] = [
    "row_key",
    "id",
    "key",
    "value",
    "num_cuts",
    "changing_heavy_atoms",
];

/// Writes one row per fragmentation record.
pub struct FragmentWriter<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> FragmentWriter<W> {
    pub fn new(output: W) -> Result<Self> {
        let mut writer = Writer::from_writer(output);
        writer.write_record(FRAGMENT_HEADERS)?;
        Ok(Self { writer })
    }

    pub fn write(&mut self, row_key: &str, id: Option<&str>, record: &FragmentationRecord) -> Result<()> {
        let cuts = record.num_cuts.to_string();
        let heavy_atoms = record.value.changing_heavy_atom_count().to_string();
        self.writer.write_record([
            row_key,
            id.unwrap_or(""),
            record.key.smiles(),
            record.value.smiles(),
            cuts.as_str(),
            heavy_atoms.as_str(),
        ])?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// A fragment row read back for pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentRow {
    pub row_key: String,
    pub id: Option<String>,
    pub key: String,
    pub value: String,
    pub num_cuts: usize,
}

pub fn read_fragment_rows<R: Read>(input: R) -> Result<Vec<FragmentRow>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(input);
    let headers = reader.headers()?.clone();
    let mut indices = [0usize; 5];
    for (slot, name) in indices.iter_mut().zip(&FRAGMENT_HEADERS[..5]) {
        *slot = column(&headers, name).ok_or_else(|| {
            MmpError::InvalidConfiguration(format!("fragment table has no '{name}' column"))
        })?;
    }
    let [row_key, id, key, value, num_cuts] = indices;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cell = |index: usize| record.get(index).unwrap_or("").to_string();
        let Ok(cuts) = cell(num_cuts).parse::<usize>() else {
            warn!("Skipping fragment row with bad cut count: {:?}", record);
            continue;
        };
        let id = Some(cell(id)).filter(|id| !id.is_empty());
        rows.push(FragmentRow {
            row_key: cell(row_key),
            id,
            key: cell(key),
            value: cell(value),
            num_cuts: cuts,
        });
    }
    debug!("Read {} fragment rows", rows.len());
    Ok(rows)
}

/// Writes rejected input rows, optionally followed by the reason.
pub struct RejectWriter<W: Write> {
    writer: Writer<W>,
    include_reason: bool,
}

impl<W: Write> RejectWriter<W> {
    pub fn new(output: W, headers: &StringRecord, include_reason: bool) -> Result<Self> {
        let mut writer = Writer::from_writer(output);
        let mut header: Vec<&str> = headers.iter().collect();
        if include_reason {
            header.push("reason");
        }
        writer.write_record(&header)?;
        Ok(Self {
            writer,
            include_reason,
        })
    }

    pub fn write(&mut self, row: &InputRow, reason: &str) -> Result<()> {
        let mut record: Vec<&str> = row.fields.iter().map(String::as_str).collect();
        if self.include_reason {
            record.push(reason);
        }
        self.writer.write_record(&record)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes transforms, with the optional columns the pairing options ask for.
pub struct TransformWriter<W: Write> {
    writer: Writer<W>,
    include_key: bool,
    include_heavy_atom_counts: bool,
    include_ratios: bool,
}

impl<W: Write> TransformWriter<W> {
    pub fn new(output: W, options: &PairingOptions) -> Result<Self> {
        let mut writer = Writer::from_writer(output);
        let mut header = vec![
            "row_key",
            "transformation",
            "left_id",
            "right_id",
            "left_value",
            "right_value",
        ];
        if options.include_key {
            header.push("key");
        }
        if options.include_heavy_atom_counts {
            header.extend(["left_changing_heavy_atoms", "right_changing_heavy_atoms", "delta_heavy_atoms"]);
        }
        if options.include_ratios {
            header.extend(["left_ratio", "right_ratio"]);
        }
        writer.write_record(&header)?;
        Ok(Self {
            writer,
            include_key: options.include_key,
            include_heavy_atom_counts: options.include_heavy_atom_counts,
            include_ratios: options.include_ratios,
        })
    }

    pub fn write(&mut self, row_key: &str, transform: &Transform) -> Result<()> {
        let mut record = vec![
            row_key.to_string(),
            transform.transformation(),
            transform.left_id().unwrap_or("").to_string(),
            transform.right_id().unwrap_or("").to_string(),
            transform.left.smiles().to_string(),
            transform.right.smiles().to_string(),
        ];
        if self.include_key {
            record.push(transform.key.as_ref().map(|k| k.to_string()).unwrap_or_default());
        }
        if self.include_heavy_atom_counts {
            let (left, right) = transform.heavy_atoms.unwrap_or((
                transform.left.changing_heavy_atom_count(),
                transform.right.changing_heavy_atom_count(),
            ));
            record.extend([
                left.to_string(),
                right.to_string(),
                transform.heavy_atom_delta().to_string(),
            ]);
        }
        if self.include_ratios {
            match transform.ratios {
                Some((left, right)) => record.extend([format!("{left:.3}"), format!("{right:.3}")]),
                None => record.extend([String::new(), String::new()]),
            }
        }
        self.writer.write_record(&record)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::canonicalize_pair;

    #[test]
    fn test_read_input_rows() {
        let csv = "name,smiles,id\naspirin,CC(=O)Oc1ccccc1C(=O)O,A1\nblank,,\n";
        let reader = InputReader::new(csv.as_bytes(), &TableOptions::default()).unwrap();
        assert_eq!(reader.headers().len(), 3);
        let rows: Vec<InputRow> = reader.rows().collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_id, "Row0");
        assert_eq!(rows[0].smiles, "CC(=O)Oc1ccccc1C(=O)O");
        assert_eq!(rows[0].id.as_deref(), Some("A1"));
        assert_eq!(rows[1].id, None);
        assert_eq!(rows[1].fields, ["blank", "", ""]);
    }

    #[test]
    fn test_missing_smiles_column() {
        let csv = "name,structure\nx,C\n";
        assert!(matches!(
            InputReader::new(csv.as_bytes(), &TableOptions::default()),
            Err(MmpError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_fragment_round_trip() {
        let (key, value) = canonicalize_pair("[1*]c1ccccc1", "[1*]O").unwrap();
        let record = FragmentationRecord::new(key, value, 1);
        let mut out = Vec::new();
        {
            let mut writer = FragmentWriter::new(&mut out).unwrap();
            writer.write("Row0_0", Some("phenol"), &record).unwrap();
            writer.flush().unwrap();
        }
        let rows = read_fragment_rows(out.as_slice()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row_key, "Row0_0");
        assert_eq!(rows[0].id.as_deref(), Some("phenol"));
        assert_eq!(rows[0].key, record.key.smiles());
        assert_eq!(rows[0].value, record.value.smiles());
        assert_eq!(rows[0].num_cuts, 1);
    }

    #[test]
    fn test_reject_reason_column() {
        let headers = StringRecord::from(vec!["smiles", "id"]);
        let row = InputRow {
            row_id: "Row0".to_string(),
            smiles: "C(".to_string(),
            id: Some("x".to_string()),
            fields: vec!["C(".to_string(), "x".to_string()],
        };
        let mut out = Vec::new();
        {
            let mut writer = RejectWriter::new(&mut out, &headers, true).unwrap();
            writer.write(&row, "Could not parse").unwrap();
            writer.flush().unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "smiles,id,reason\nC(,x,Could not parse\n");
    }
}
