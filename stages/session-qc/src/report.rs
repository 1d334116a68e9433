//! 终端输出.

use std::io::{self, Write};

use qc_berry::pipeline::{ManufacturerMissing, PhaseMap};

/// 把按阶段分组的启发式表写进 `w` 中.
///
/// 列为 `Phase | Heuristic | Name | Description`, 按最长单元格对齐.
pub fn heuristics_table_into<W: Write>(phases: &PhaseMap, w: &mut W) -> io::Result<()> {
    let header = ["Phase", "Heuristic", "Name", "Description"];
    let rows: Vec<[String; 4]> = phases
        .iter()
        .flat_map(|(phase, hs)| {
            hs.iter().map(move |h| {
                [
                    phase.to_string(),
                    h.name().to_string(),
                    h.label().to_string(),
                    h.description().to_string(),
                ]
            })
        })
        .collect();

    let mut widths = header.map(|h| h.chars().count());
    for row in rows.iter() {
        for (width, c) in widths.iter_mut().zip(row) {
            *width = (*width).max(c.chars().count());
        }
    }

    let fmt_row = |cols: &[&str]| -> String {
        cols.iter()
            .zip(widths)
            .map(|(c, w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    writeln!(w, "Heuristics by phase:")?;
    writeln!(w)?;
    writeln!(w, "{}", fmt_row(&header))?;
    writeln!(w, "{}", widths.map(|n| "-".repeat(n)).join("-+-"))?;
    for row in rows.iter() {
        let cols: Vec<&str> = row.iter().map(String::as_str).collect();
        writeln!(w, "{}", fmt_row(&cols))?;
    }
    writeln!(w)?;
    Ok(())
}

/// 把阶段 `phase` 输入表上按厂商的缺失字段统计写进 `w` 中.
pub fn missing_by_manufacturer_into<W: Write>(
    phase: u32,
    m: &[ManufacturerMissing],
    w: &mut W,
) -> io::Result<()> {
    const S4: &str = "    ";

    writeln!(w, "Missing fields by manufacturer (phase {phase} input):")?;
    for x in m.iter() {
        writeln!(
            w,
            "{S4}{:<8} sessions {:>5}, TR {:>4}, geometry {:>4}, PercentPhaseFOV {:>4}, CoilString {:>4}",
            x.manufacturer, x.sessions, x.repetition_time, x.geometry, x.percent_phase_fov, x.coil_string
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qc_berry::pipeline::default_phases;

    #[test]
    fn test_heuristics_table() {
        let mut buf = Vec::new();
        heuristics_table_into(&default_phases(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Heuristics by phase:");
        assert!(lines[2].starts_with("Phase | Heuristic"));
        assert!(lines[3].starts_with("------+-"));
        // 8 个启发式
        assert_eq!(lines.iter().filter(|l| l.contains("filter_")).count(), 8);
        assert!(lines[4].starts_with("0     | filter_missing_data_adnidap"));
    }

    #[test]
    fn test_missing_by_manufacturer_names_phase() {
        let m = [ManufacturerMissing {
            manufacturer: "GE",
            sessions: 4,
            repetition_time: 1,
            geometry: 0,
            percent_phase_fov: 2,
            coil_string: 3,
        }];
        let mut buf = Vec::new();
        missing_by_manufacturer_into(1, &m, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Missing fields by manufacturer (phase 1 input):");
        assert_eq!(
            lines[1],
            "    GE       sessions     4, TR    1, geometry    0, PercentPhaseFOV    2, CoilString    3"
        );
    }
}
