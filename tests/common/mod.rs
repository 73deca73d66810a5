#![allow(dead_code)]

//! Synthetic extracts laid out like the published workbooks: title, disclaimer, category
//! header, sub-header, blank row, data, footer.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use laschooldata::ingestion::{RawSheet, RawWorkbook};

pub fn tmp_dir(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("laschooldata-{tag}-{nanos}"));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|s| s.to_string()).collect()
}

fn with_commas(n: i64) -> String {
    let digits = n.abs().to_string();
    let mut out = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if n < 0 { format!("-{out}") } else { out }
}

fn count_cell(v: Option<i64>) -> String {
    v.map(with_commas).unwrap_or_else(|| "<10".to_string())
}

/// One district, school or state row. Percentages are on the 0–100 scale.
#[derive(Debug, Clone)]
pub struct Entity {
    pub district_id: &'static str,
    pub district_name: &'static str,
    pub site: Option<(&'static str, &'static str)>,
    pub total: i64,
    /// american indian, asian, black, hispanic, pacific islander, white, multiracial
    pub race: [Option<i64>; 7],
    /// female, male, minority, lep, econ disadvantaged, swd
    pub pcts: [f64; 6],
    /// infants, pre-k, k, grades 1-12, T9, extension academy
    pub grades: [Option<i64>; 17],
}

impl Entity {
    fn band(&self, from: usize, to: usize) -> Option<i64> {
        self.grades[from..=to]
            .iter()
            .flatten()
            .fold(None, |acc, v| Some(acc.unwrap_or(0) + v))
    }
}

pub const STATE_TOTAL: i64 = 15_000;

pub fn state_row() -> Entity {
    Entity {
        district_id: "000",
        district_name: "State Totals",
        site: None,
        total: STATE_TOTAL,
        race: [Some(70), Some(140), Some(4_000), Some(1_000), Some(12), Some(9_328), Some(450)],
        pcts: [49.0, 51.0, 40.0, 4.0, 68.0, 13.0],
        grades: [
            Some(5),
            Some(450),
            Some(1_050),
            Some(1_120),
            Some(1_120),
            Some(1_120),
            Some(1_120),
            Some(1_120),
            Some(1_080),
            Some(1_080),
            Some(1_080),
            Some(1_030),
            Some(1_010),
            Some(990),
            Some(970),
            Some(305),
            Some(350),
        ],
    }
}

pub fn districts() -> Vec<Entity> {
    vec![
        Entity {
            district_id: "001",
            district_name: "Acadia Parish",
            site: None,
            total: 10_000,
            race: [Some(50), Some(100), Some(3_000), Some(800), Some(12), Some(5_738), Some(300)],
            pcts: [48.0, 52.0, 45.0, 5.0, 70.0, 12.0],
            grades: [
                Some(5),
                Some(300),
                Some(700),
                Some(750),
                Some(750),
                Some(750),
                Some(750),
                Some(750),
                Some(720),
                Some(720),
                Some(720),
                Some(690),
                Some(680),
                Some(670),
                Some(660),
                Some(185),
                Some(200),
            ],
        },
        Entity {
            district_id: "002",
            district_name: "Allen Parish",
            site: None,
            total: 5_000,
            race: [Some(20), Some(40), Some(1_000), Some(200), None, Some(3_590), Some(150)],
            pcts: [51.0, 49.0, 30.0, 2.0, 64.0, 15.0],
            grades: [
                None,
                Some(150),
                Some(350),
                Some(370),
                Some(370),
                Some(370),
                Some(370),
                Some(370),
                Some(360),
                Some(360),
                Some(360),
                Some(340),
                Some(330),
                Some(320),
                Some(310),
                Some(120),
                Some(150),
            ],
        },
    ]
}

pub fn schools() -> Vec<Entity> {
    let mut elementary = [None; 17];
    elementary[2] = Some(100);
    for g in elementary.iter_mut().take(8).skip(3) {
        *g = Some(100);
    }
    let mut high = [None; 17];
    for g in high.iter_mut().take(15).skip(11) {
        *g = Some(100);
    }
    vec![
        Entity {
            district_id: "001",
            district_name: "Acadia Parish",
            site: Some(("001001", "Acadia Elementary")),
            total: 600,
            race: [Some(3), Some(6), Some(180), Some(48), None, Some(345), Some(18)],
            pcts: [50.0, 50.0, 40.0, 6.0, 72.0, 11.0],
            grades: elementary,
        },
        Entity {
            district_id: "001",
            district_name: "Acadia Parish",
            site: Some(("001002", "Acadia High")),
            total: 400,
            race: [Some(2), Some(4), Some(120), Some(30), None, Some(230), Some(14)],
            pcts: [45.0, 55.0, 35.0, 3.0, 60.0, 14.0],
            grades: high,
        },
    ]
}

const RACE_HEADERS: [&str; 7] = [
    "Am Ind",
    "Asian",
    "Black",
    "Hispanic",
    "Native Hawaiian/Pacific Islander",
    "White",
    "Multiple Races",
];

const RACE_PCT_HEADERS: [&str; 7] = [
    "Am Ind %",
    "Asian %",
    "Black %",
    "Hispanic %",
    "Pacific Islander %",
    "White %",
    "Multiple Races %",
];

const GRADE_HEADERS: [&str; 17] = [
    "Infants", "Pre-K", "K", "Grade 1", "Grade 2", "Grade 3", "Grade 4", "Grade 5", "Grade 6", "Grade 7",
    "Grade 8", "Grade 9", "Grade 10", "Grade 11", "Grade 12", "T9", "Ext Acad",
];

const BAND_HEADERS: [&str; 8] = [
    "Infants",
    "Pre-K",
    "K",
    "Grades 1-5",
    "Grades 6-8",
    "Grades 9-12",
    "T9",
    "Ext Acad",
];

/// Layout of enrollment extracts by end year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentLayout {
    /// Through 2019: grade bands, fractional percentages.
    Banded,
    /// 2020–2023: single grades, fractional percentages.
    PerGrade,
    /// From 2024: race percentages added, percentages carry a `%` sign.
    Signed,
}

impl EnrollmentLayout {
    pub fn for_year(end_year: u16) -> Self {
        match end_year {
            ..=2019 => Self::Banded,
            2020..=2023 => Self::PerGrade,
            _ => Self::Signed,
        }
    }

    /// (female, male, minority, lep, econ, swd) indices and headers present in this layout.
    fn percent_columns(self) -> Vec<(usize, &'static str)> {
        match self {
            Self::Banded => vec![(0, "Female %"), (1, "Male %"), (3, "LEP %"), (4, "Econ Disadv %")],
            Self::PerGrade => vec![
                (0, "Female %"),
                (1, "Male %"),
                (2, "Minority %"),
                (3, "LEP %"),
                (4, "Econ Disadv %"),
            ],
            Self::Signed => vec![
                (2, "Minority %"),
                (0, "Female %"),
                (1, "Male %"),
                (3, "LEP %"),
                (4, "Econ Disadv %"),
                (5, "SWD %"),
            ],
        }
    }

    fn pct_cell(self, pct: f64) -> String {
        match self {
            Self::Signed => format!("{pct:.1}%"),
            Self::Banded | Self::PerGrade => format!("{}", pct / 100.0),
        }
    }
}

fn enrollment_headers(layout: EnrollmentLayout, with_site: bool) -> (Vec<String>, Vec<(usize, &'static str)>) {
    let mut headers = row(&["School System", "School System Name"]);
    if with_site {
        headers.extend(row(&["Site Code", "Site Name"]));
    }
    let mut categories = vec![(0, "Entity")];

    headers.push("Total Students".to_string());
    categories.push((headers.len(), "Race/Ethnicity"));
    headers.extend(row(&RACE_HEADERS));
    if layout == EnrollmentLayout::Signed {
        headers.extend(row(&RACE_PCT_HEADERS));
    }
    categories.push((headers.len(), "Student Populations"));
    headers.extend(layout.percent_columns().into_iter().map(|(_, h)| h.to_string()));
    if layout == EnrollmentLayout::Signed {
        headers.extend(row(&["% Homeless", "% Migrant"]));
    }
    categories.push((headers.len(), "Grade"));
    match layout {
        EnrollmentLayout::Banded => headers.extend(row(&BAND_HEADERS)),
        EnrollmentLayout::PerGrade | EnrollmentLayout::Signed => headers.extend(row(&GRADE_HEADERS)),
    }
    (headers, categories)
}

fn enrollment_cells(layout: EnrollmentLayout, e: &Entity, with_site: bool) -> Vec<String> {
    let mut cells = vec![e.district_id.to_string(), e.district_name.to_string()];
    if with_site {
        let (code, name) = e.site.unwrap_or(("", ""));
        cells.push(code.to_string());
        cells.push(name.to_string());
    }
    cells.push(with_commas(e.total));
    cells.extend(e.race.iter().map(|v| count_cell(*v)));
    if layout == EnrollmentLayout::Signed {
        cells.extend(e.race.iter().map(|v| match v {
            Some(n) => format!("{:.1}%", 100.0 * *n as f64 / e.total as f64),
            None => "*".to_string(),
        }));
    }
    cells.extend(
        layout
            .percent_columns()
            .into_iter()
            .map(|(i, _)| layout.pct_cell(e.pcts[i])),
    );
    if layout == EnrollmentLayout::Signed {
        cells.extend(row(&["0.5%", "0.1%"]));
    }
    match layout {
        EnrollmentLayout::Banded => {
            let bands = [
                e.grades[0],
                e.grades[1],
                e.grades[2],
                e.band(3, 7),
                e.band(8, 10),
                e.band(11, 14),
                e.grades[15],
                e.grades[16],
            ];
            cells.extend(bands.iter().map(|v| count_cell(*v)));
        }
        EnrollmentLayout::PerGrade | EnrollmentLayout::Signed => {
            cells.extend(e.grades.iter().map(|v| count_cell(*v)));
        }
    }
    cells
}

/// A sheet with the standard header block: title (row 0), disclaimer (1), category header (2),
/// sub-header (3), blank (4), data from row 5, then a footer.
pub fn standard_sheet(
    name: &str,
    title: &str,
    categories: &[(usize, &str)],
    headers: Vec<String>,
    data: Vec<Vec<String>>,
) -> RawSheet {
    let mut category_row = vec![String::new(); headers.len()];
    for (idx, text) in categories {
        if let Some(cell) = category_row.get_mut(*idx) {
            *cell = text.to_string();
        }
    }
    let mut rows = vec![
        row(&[title]),
        row(&["Counts are as of October 1 and are preliminary."]),
        category_row,
        headers,
        Vec::new(),
    ];
    rows.extend(data);
    rows.push(Vec::new());
    rows.push(row(&["Note: counts under 10 are suppressed (<10)."]));
    RawSheet::new(name, rows)
}

pub fn enrollment_district_sheet(end_year: u16, with_state_row: bool) -> RawSheet {
    let layout = EnrollmentLayout::for_year(end_year);
    let (headers, categories) = enrollment_headers(layout, false);
    let mut entities = Vec::new();
    if with_state_row {
        entities.push(state_row());
    }
    entities.extend(districts());
    let data = entities
        .iter()
        .map(|e| enrollment_cells(layout, e, false))
        .collect();
    standard_sheet(
        "Total by School System",
        &format!("October 1, {} Multi Stats", end_year - 1),
        &categories,
        headers,
        data,
    )
}

pub fn enrollment_school_sheet(end_year: u16) -> RawSheet {
    let layout = EnrollmentLayout::for_year(end_year);
    let (headers, categories) = enrollment_headers(layout, true);
    let data = schools()
        .iter()
        .map(|e| enrollment_cells(layout, e, true))
        .collect();
    standard_sheet(
        "Total by Site",
        &format!("October 1, {} Multi Stats by Site", end_year - 1),
        &categories,
        headers,
        data,
    )
}

pub fn enrollment_workbook(end_year: u16, with_state_row: bool, with_schools: bool) -> RawWorkbook {
    let mut sheets = vec![
        RawSheet::new("Read Me", vec![row(&["About this file"])]),
        enrollment_district_sheet(end_year, with_state_row),
    ];
    if with_schools {
        sheets.push(enrollment_school_sheet(end_year));
    }
    RawWorkbook::new(sheets)
}

/// Write every row of `sheet` as CSV.
pub fn sheet_to_csv(sheet: &RawSheet) -> Vec<u8> {
    let mut w = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for r in &sheet.rows {
        if r.is_empty() {
            w.write_record([""]).unwrap();
        } else {
            w.write_record(r).unwrap();
        }
    }
    w.into_inner().unwrap()
}

/// The district sheet of `end_year` as a single-sheet CSV payload.
pub fn enrollment_csv(end_year: u16) -> Vec<u8> {
    sheet_to_csv(&enrollment_district_sheet(end_year, true))
}

const LEVELS: [&str; 5] = ["Advanced", "Mastery", "Basic", "Approaching Basic", "Unsatisfactory"];

/// LEAP summary by school system. Tested counts keep a 2:1 ratio between the two parishes so the
/// embedded state percentages equal the district-weighted ones exactly.
pub fn assessment_workbook(end_year: u16) -> RawWorkbook {
    let subjects: &[(&str, [i64; 2])] = if end_year >= 2021 {
        &[
            ("ELA", [1_000, 500]),
            ("Math", [990, 495]),
            ("Science", [600, 300]),
            ("Social Studies", [580, 290]),
        ]
    } else {
        &[("ELA", [1_000, 500]), ("Math", [990, 495]), ("Science", [600, 300])]
    };
    let signed = end_year >= 2021;
    let level_pcts: [[f64; 5]; 3] = [
        [8.0, 18.0, 32.0, 26.0, 16.0],
        [10.0, 20.0, 30.0, 25.0, 15.0],
        [4.0, 14.0, 36.0, 28.0, 18.0],
    ];
    let pct_cell = |p: f64| if signed { format!("{p:.1}%") } else { format!("{p}") };

    let mut headers = row(&["School System", "School System Name"]);
    let mut categories = vec![(0, "Entity")];
    for (subject, _) in subjects {
        categories.push((headers.len(), *subject));
        headers.push(format!("{subject} Tested"));
        headers.extend(LEVELS.iter().map(|l| format!("{subject} {l} %")));
    }

    let entities = [("000", "State Totals"), ("001", "Acadia Parish"), ("002", "Allen Parish")];
    let data = entities
        .iter()
        .enumerate()
        .map(|(i, (id, name))| {
            let mut cells = vec![id.to_string(), name.to_string()];
            for (_, tested) in subjects {
                let n = if i == 0 { tested[0] + tested[1] } else { tested[i - 1] };
                cells.push(with_commas(n));
                cells.extend(level_pcts[i].iter().map(|p| pct_cell(*p)));
            }
            cells
        })
        .collect();

    RawWorkbook::new(vec![standard_sheet(
        "Total by School System",
        &format!("Spring {end_year} LEAP Achievement Level Summary"),
        &categories,
        headers,
        data,
    )])
}

pub fn directory_workbook() -> RawWorkbook {
    let headers = row(&[
        "School System",
        "School System Name",
        "Site Code",
        "Site Name",
        "Address",
        "City",
        "State",
        "Zip",
        "Phone",
        "Grades Served",
        "School Type",
        "Principal",
    ]);
    let data = vec![
        row(&[
            "001",
            "Acadia Parish",
            "001001",
            "Acadia Elementary",
            " 100 Main St ",
            "Crowley",
            "LA",
            "70526",
            "337-555-0100",
            "PK-05",
            "Elementary",
            "N/A",
        ]),
        row(&[
            "036",
            "Orleans Parish",
            "036001",
            "Audubon Charter",
            "428 Broadway St",
            "New Orleans",
            "LA",
            "70118",
            "504-555-0199",
            "PK-08",
            "Charter",
            "J. Doe",
        ]),
    ];
    RawWorkbook::new(vec![standard_sheet(
        "School Directory",
        "Louisiana School Directory",
        &[(0, "School System"), (4, "Location")],
        headers,
        data,
    )])
}
