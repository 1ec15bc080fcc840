use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fmt::Write;
use xbrl_filing::{xml, ContextMapper, InstanceParser, PeriodType};

const CONCEPTS: &[&str] = &[
    "Revenues",
    "CostOfRevenue",
    "GrossProfit",
    "OperatingExpenses",
    "OperatingIncomeLoss",
    "NetIncomeLoss",
    "Assets",
    "Liabilities",
    "StockholdersEquity",
    "CashAndCashEquivalentsAtCarryingValue",
];

/// Instance with `years` fiscal years, one duration and one instant context
/// each, plus a dimensional context per year.
fn generated_instance(years: i32) -> String {
    let mut doc = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
    xmlns:xbrldi="http://xbrl.org/2006/xbrldi"
    xmlns:iso4217="http://www.xbrl.org/2003/iso4217"
    xmlns:us-gaap="http://fasb.org/us-gaap/2024"
    xmlns:dei="http://xbrl.sec.gov/dei/2024">
  <xbrli:unit id="usd"><xbrli:measure>iso4217:USD</xbrli:measure></xbrli:unit>
  <dei:EntityRegistrantName contextRef="D2000">Bench Corp</dei:EntityRegistrantName>
"#,
    );

    for year in 2000..2000 + years {
        let _ = write!(
            doc,
            r#"  <xbrli:context id="D{y}"><xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000000001</xbrli:identifier></xbrli:entity><xbrli:period><xbrli:startDate>{y}-01-01</xbrli:startDate><xbrli:endDate>{y}-12-31</xbrli:endDate></xbrli:period></xbrli:context>
  <xbrli:context id="I{y}"><xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000000001</xbrli:identifier></xbrli:entity><xbrli:period><xbrli:instant>{y}-12-31</xbrli:instant></xbrli:period></xbrli:context>
  <xbrli:context id="S{y}"><xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000000001</xbrli:identifier><xbrli:segment><xbrldi:explicitMember dimension="us-gaap:StatementBusinessSegmentsAxis">us-gaap:CorporateMember</xbrldi:explicitMember></xbrli:segment></xbrli:entity><xbrli:period><xbrli:startDate>{y}-01-01</xbrli:startDate><xbrli:endDate>{y}-12-31</xbrli:endDate></xbrli:period></xbrli:context>
"#,
            y = year
        );
        for (i, concept) in CONCEPTS.iter().enumerate() {
            let context = if i < 6 { "D" } else { "I" };
            let value = (i as i64 + 1) * 1_000_000 + year as i64;
            let _ = writeln!(
                doc,
                r#"  <us-gaap:{c} contextRef="{ctx}{y}" unitRef="usd" decimals="-3">{v}</us-gaap:{c}>
  <us-gaap:{c} contextRef="S{y}" unitRef="usd" decimals="-3">{half}</us-gaap:{c}>"#,
                c = concept,
                ctx = context,
                y = year,
                v = value,
                half = value / 2
            );
        }
    }
    doc.push_str("</xbrli:xbrl>\n");
    doc
}

fn bench_instance_parsing(c: &mut Criterion) {
    let content = generated_instance(20);
    let parser = InstanceParser::new();

    c.bench_function("parse_instance_20y", |b| {
        b.iter(|| {
            let root = xml::parse_str(black_box(&content), "bench").unwrap();
            parser.parse_element(&root, "bench").unwrap()
        });
    });
}

fn bench_context_mapping(c: &mut Criterion) {
    let content = generated_instance(20);
    let root = xml::parse_str(&content, "bench").unwrap();
    let document = InstanceParser::new().parse_element(&root, "bench").unwrap();

    c.bench_function("context_mapper_new", |b| {
        b.iter(|| ContextMapper::new(black_box(&document.facts)));
    });

    let mapper = ContextMapper::new(&document.facts);
    c.bench_function("value_for_year", |b| {
        b.iter(|| {
            for year in 2000..2020 {
                black_box(mapper.value_for_year("Revenues", year, PeriodType::Duration));
                black_box(mapper.value_for_year("us-gaap:Assets", year, PeriodType::Instant));
            }
        });
    });
}

criterion_group!(benches, bench_instance_parsing, bench_context_mapping);
criterion_main!(benches);
