use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use laschooldata::ingestion::{read_workbook, RawSheet, RawWorkbook};
use laschooldata::processing::{normalize_workbook, pivot_longer, NormalizeOptions};
use laschooldata::schema::value::normalize_percent_column;
use laschooldata::types::DatasetKind;

const GRADES: [&str; 17] = [
    "Infants", "Pre-K", "K", "Grade 1", "Grade 2", "Grade 3", "Grade 4", "Grade 5", "Grade 6", "Grade 7",
    "Grade 8", "Grade 9", "Grade 10", "Grade 11", "Grade 12", "T9", "Ext Acad",
];

fn headers(with_site: bool) -> Vec<String> {
    let mut h: Vec<String> = vec!["School System".into(), "School System Name".into()];
    if with_site {
        h.extend(["Site Code".to_string(), "Site Name".to_string()]);
    }
    h.push("Total Students".into());
    h.extend(
        ["Am Ind", "Asian", "Black", "Hispanic", "Native Hawaiian/Pacific Islander", "White", "Multiple Races"]
            .map(String::from),
    );
    h.extend(["Female %", "Male %", "Minority %", "LEP %", "Econ Disadv %"].map(String::from));
    h.extend(GRADES.map(String::from));
    h
}

fn data_row(district: usize, site: Option<usize>, total: i64) -> Vec<String> {
    let mut r = vec![format!("{district:03}"), format!("Parish {district}")];
    if let Some(s) = site {
        r.push(format!("{district:03}{s:03}"));
        r.push(format!("School {s}"));
    }
    r.push(total.to_string());
    let race = [total / 200, total / 100, total * 3 / 10, total / 10, 0, total / 2];
    let multi = total - race.iter().sum::<i64>();
    r.extend(race.iter().map(|v| if *v < 10 { "<10".to_string() } else { v.to_string() }));
    r.push(multi.to_string());
    let female = 0.45 + (district % 10) as f64 / 100.0;
    r.extend([female, 1.0 - female, 0.4, 0.05, 0.7].map(|p| format!("{p:.3}")));
    r.extend((0..17).map(|g| (total / 17 + g).to_string()));
    r
}

/// PerGrade-era workbook with `districts` districts and `schools` schools per district.
fn synthetic_workbook(districts: usize, schools: usize) -> RawWorkbook {
    let block = |h: Vec<String>| {
        vec![
            vec!["October 1, 2021 Multi Stats".to_string()],
            vec!["Preliminary".to_string()],
            vec!["Entity".to_string()],
            h,
            Vec::new(),
        ]
    };

    let mut d_rows = block(headers(false));
    let mut s_rows = block(headers(true));
    for d in 1..=districts {
        d_rows.push(data_row(d, None, 1_000 * schools as i64));
        for s in 1..=schools {
            s_rows.push(data_row(d, Some(s), 1_000));
        }
    }
    RawWorkbook::new(vec![
        RawSheet::new("Total by School System", d_rows),
        RawSheet::new("Total by Site", s_rows),
    ])
}

fn bench_normalize(c: &mut Criterion) {
    let opts = NormalizeOptions::default();
    let mut group = c.benchmark_group("normalize_workbook");
    for (districts, schools) in [(70, 10), (70, 40)] {
        let wb = synthetic_workbook(districts, schools);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{districts}x{schools}")),
            &wb,
            |b, wb| b.iter(|| normalize_workbook(DatasetKind::Enrollment, 2022, black_box(wb), &opts).unwrap()),
        );
    }
    group.finish();
}

fn bench_pivot(c: &mut Criterion) {
    let out = normalize_workbook(
        DatasetKind::Enrollment,
        2022,
        &synthetic_workbook(70, 20),
        &NormalizeOptions::default(),
    )
    .unwrap();
    c.bench_function("pivot_longer_70x20", |b| {
        b.iter(|| pivot_longer(black_box(&out.records), DatasetKind::Enrollment).unwrap())
    });
}

fn bench_percent_column(c: &mut Criterion) {
    let cells: Vec<String> = (0..5_000).map(|i| format!("{:.3}", (i % 1000) as f64 / 1000.0)).collect();
    c.bench_function("normalize_percent_column_5k", |b| {
        b.iter(|| normalize_percent_column(black_box(cells.as_slice())))
    });
}

fn bench_csv_decode(c: &mut Criterion) {
    let wb = synthetic_workbook(70, 40);
    let mut w = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
    for r in &wb.sheets[1].rows {
        if r.is_empty() {
            w.write_record([""]).unwrap();
        } else {
            w.write_record(r).unwrap();
        }
    }
    let bytes = w.into_inner().unwrap();
    c.bench_function("read_workbook_csv_2800_rows", |b| {
        b.iter(|| read_workbook(black_box(bytes.clone()), None, 2022).unwrap())
    });
}

criterion_group!(benches, bench_normalize, bench_pivot, bench_percent_column, bench_csv_decode);
criterion_main!(benches);
