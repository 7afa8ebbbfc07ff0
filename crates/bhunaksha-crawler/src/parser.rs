//! Line grammar for the plot detail panel.
//!
//! ```text
//! block   := line*
//! record  := "Survey No." line, then field lines up to the next "Survey No." line or end
//! field   := LABEL ": " VALUE
//! ```
//!
//! Lines that carry no known label, or a label without `": "`, are skipped.

use bhunaksha_core::ParcelRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    SurveyNo,
    TotalArea,
    PotKharaba,
    OwnerName,
    KhataNo,
}

impl Field {
    const ALL: [Field; 5] = [
        Field::SurveyNo,
        Field::TotalArea,
        Field::PotKharaba,
        Field::OwnerName,
        Field::KhataNo,
    ];

    fn label(self) -> &'static str {
        match self {
            Field::SurveyNo => "Survey No.",
            Field::TotalArea => "Total Area",
            Field::PotKharaba => "Pot kharaba",
            Field::OwnerName => "Owner Name",
            Field::KhataNo => "Khata No.",
        }
    }

    /// The field a line carries and its value.
    fn parse_line(line: &str) -> Option<(Field, &str)> {
        let field = Self::ALL
            .into_iter()
            .find(|field| line.starts_with(field.label()))?;
        let (_, value) = line.split_once(": ")?;
        Some((field, value))
    }
}

#[derive(Debug, Default)]
struct RecordBuilder {
    record: ParcelRecord,
    touched: bool,
}

impl RecordBuilder {
    fn set(&mut self, field: Field, value: &str) {
        let slot = match field {
            Field::SurveyNo => &mut self.record.survey_no,
            Field::TotalArea => &mut self.record.total_area,
            Field::PotKharaba => &mut self.record.pot_kharaba,
            Field::OwnerName => &mut self.record.owner_name,
            Field::KhataNo => &mut self.record.khata_no,
        };
        *slot = value.to_string();
        self.touched = true;
    }

    fn finish(self) -> Option<ParcelRecord> {
        self.touched.then_some(self.record)
    }
}

/// Parse one detail panel text into its stacked parcel records, in order.
pub fn parse_block(text: &str) -> Vec<ParcelRecord> {
    let mut records = Vec::new();
    let mut current = RecordBuilder::default();

    for line in text.lines() {
        let Some((field, value)) = Field::parse_line(line) else {
            continue;
        };
        if field == Field::SurveyNo {
            records.extend(std::mem::take(&mut current).finish());
        }
        current.set(field, value);
    }
    records.extend(current.finish());

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    const STACKED: &str = "Plot Info\n\
        Survey No.: 12/1\n\
        Total Area: 1.2100\n\
        Pot kharaba: 0.0200\n\
        Owner Name: Ramesh Patil, Suresh Patil\n\
        Khata No.: 345\n\
        Survey No.: 12/2\n\
        Total Area: 0.4000\n\
        Owner Name: Sita Jadhav\n\
        Khata No.: 346";

    #[test]
    fn test_parse_stacked_records() {
        let records = parse_block(STACKED);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].survey_no, "12/1");
        assert_eq!(records[0].total_area, "1.2100");
        assert_eq!(records[0].pot_kharaba, "0.0200");
        assert_eq!(records[0].owner_name, "Ramesh Patil, Suresh Patil");
        assert_eq!(records[0].khata_no, "345");
        assert_eq!(records[1].survey_no, "12/2");
        assert_eq!(records[1].pot_kharaba, "");
        assert_eq!(records[1].khata_no, "346");
    }

    #[test]
    fn test_value_splits_on_first_separator_only() {
        let records = parse_block("Survey No.: 7\nOwner Name: Trust: Gram Panchayat");
        assert_eq!(records[0].owner_name, "Trust: Gram Panchayat");
    }

    #[test]
    fn test_unknown_and_malformed_lines_are_skipped() {
        let records = parse_block("Village map\nSurvey No.: 9\nTotal Area 3.0\nRemarks: none\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].survey_no, "9");
        assert_eq!(records[0].total_area, "");
    }

    #[test]
    fn test_crlf_lines() {
        let records = parse_block("Survey No.: 5\r\nTotal Area: 2.5\r\n");
        assert_eq!(records[0].total_area, "2.5");
    }

    #[test]
    fn test_fields_before_first_survey_line_form_a_record() {
        let records = parse_block("Total Area: 0.5\nSurvey No.: 3\nTotal Area: 1.0");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].survey_no, "");
        assert_eq!(records[0].total_area, "0.5");
        assert_eq!(records[1].survey_no, "3");
    }

    #[test]
    fn test_empty_block() {
        assert!(parse_block("").is_empty());
        assert!(parse_block("No data found").is_empty());
    }

    #[test]
    fn test_parse_is_repeatable() {
        assert_eq!(parse_block(STACKED), parse_block(STACKED));
    }
}
