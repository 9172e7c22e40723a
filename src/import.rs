use std::io::Read;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProgressRow {
    pub subject: String,
    pub topic: String,
    pub progress_percent: u8,
}

pub fn parse_progress<R: Read>(input: R) -> anyhow::Result<Vec<ProgressRow>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<ProgressRow>().enumerate() {
        let row = result.with_context(|| format!("invalid progress row {}", index + 1))?;
        rows.push(row);
    }

    Ok(rows)
}

pub fn read_progress_csv(csv_path: &Path) -> anyhow::Result<Vec<ProgressRow>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    parse_progress(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_with_whitespace() {
        let input = "subject,topic,progress_percent\nBasis Data, Normalisasi ,45\nJaringan Komputer,Subnetting,80\n";
        let rows = parse_progress(input.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].topic, "Normalisasi");
        assert_eq!(rows[1].progress_percent, 80);
    }

    #[test]
    fn rejects_non_numeric_progress() {
        let input = "subject,topic,progress_percent\nBasis Data,Normalisasi,half\n";
        assert!(parse_progress(input.as_bytes()).is_err());
    }
}
