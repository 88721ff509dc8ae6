//! Delimited-text export of the average link rate table.
//!
//! The output opens cleanly in spreadsheet tools: UTF-8 with a BOM, a fixed
//! header row, and rows sorted by test group then numeric node/neighbor id.

use std::cmp::Ordering;

use serde::Serialize;

use crate::models::AverageLinkRate;

pub const BOM: &str = "\u{feff}";

pub const HEADER: [&str; 5] = [
    "Node ID",
    "Neighbor ID",
    "Average Reception Rate",
    "Test Group",
    "Average Signal Strength",
];

#[derive(Serialize)]
struct CsvRow<'a> {
    node_id: &'a str,
    neighbor_id: &'a str,
    average_reception_rate: f64,
    test_group: &'a str,
    average_rssi: Option<f64>,
}

// ---

/// Render rows as BOM-prefixed UTF-8 CSV. A missing signal strength is an
/// empty cell.
pub fn averages_to_csv(rows: &[AverageLinkRate]) -> csv::Result<Vec<u8>> {
    // ---
    let mut sorted: Vec<&AverageLinkRate> = rows.iter().collect();
    sorted.sort_by(|a, b| {
        a.test_group
            .cmp(&b.test_group)
            .then_with(|| cmp_ids(&a.node_id, &b.node_id))
            .then_with(|| cmp_ids(&a.neighbor_id, &b.neighbor_id))
    });

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(BOM.as_bytes().to_vec());
    wtr.write_record(HEADER)?;

    for row in sorted {
        wtr.serialize(CsvRow {
            node_id: &row.node_id,
            neighbor_id: &row.neighbor_id,
            average_reception_rate: row.average_reception_rate,
            test_group: &row.test_group,
            average_rssi: row.average_rssi,
        })?;
    }

    wtr.into_inner().map_err(|e| e.into_error().into())
}

/// Numeric ids first in numeric order, then everything else lexically.
fn cmp_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn avg(node: &str, neighbor: &str, rate: f64, group: &str, rssi: Option<f64>) -> AverageLinkRate {
        AverageLinkRate {
            node_id: node.into(),
            neighbor_id: neighbor.into(),
            test_group: group.into(),
            average_reception_rate: rate,
            average_rssi: rssi,
        }
    }

    fn render(rows: &[AverageLinkRate]) -> String {
        String::from_utf8(averages_to_csv(rows).unwrap()).unwrap()
    }

    #[test]
    fn test_header_and_bom() {
        // ---
        let csv = render(&[]);
        assert!(averages_to_csv(&[]).unwrap().starts_with(&[0xEF, 0xBB, 0xBF]));
        assert_eq!(
            csv.trim_start_matches(BOM),
            "Node ID,Neighbor ID,Average Reception Rate,Test Group,Average Signal Strength\n"
        );
    }

    #[test]
    fn test_rows_sorted_numerically() {
        // ---
        let csv = render(&[
            avg("10", "2", 1.5, "Test #1", None),
            avg("2", "10", 0.25, "Test #1", Some(-61.5)),
            avg("2", "3", 2.0, "Test #1", None),
            avg("unknown", "1", 1.0, "Test #1", None),
            avg("1", "1", 1.0, "Test #0", None),
        ]);
        let lines: Vec<&str> = csv.lines().skip(1).collect();
        assert_eq!(
            lines,
            vec![
                "1,1,1.0,Test #0,",
                "2,3,2.0,Test #1,",
                "2,10,0.25,Test #1,-61.5",
                "10,2,1.5,Test #1,",
                "unknown,1,1.0,Test #1,",
            ]
        );
    }

    #[test]
    fn test_fields_are_quoted_when_needed() {
        // ---
        let csv = render(&[avg("1", "2", 1.0, "run \"a\", b", None)]);
        assert!(csv.contains("1,2,1.0,\"run \"\"a\"\", b\",\n"));
    }
}
