// Shared on-disk filing fixture
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use xbrl_filing::{FileRole, FilingFiles};

pub const PREFIX: &str = "acme-20241231";

const SCHEMA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:xbrli="http://www.xbrl.org/2003/instance"
           xmlns:link="http://www.xbrl.org/2003/linkbase"
           xmlns:xlink="http://www.w3.org/1999/xlink"
           xmlns:acme="http://acme.example/2024"
           targetNamespace="http://acme.example/2024">
  <xs:annotation>
    <xs:appinfo>
      <link:linkbaseRef xlink:type="simple" xlink:href="acme-20241231_cal.xml"
        xlink:role="http://www.xbrl.org/2003/role/calculationLinkbaseRef"
        xlink:arcrole="http://www.w3.org/1999/xlink/properties/linkbase"/>
      <link:linkbaseRef xlink:type="simple" xlink:href="acme-20241231_def.xml"
        xlink:role="http://www.xbrl.org/2003/role/definitionLinkbaseRef"
        xlink:arcrole="http://www.w3.org/1999/xlink/properties/linkbase"/>
      <link:linkbaseRef xlink:type="simple" xlink:href="acme-20241231_lab.xml"
        xlink:role="http://www.xbrl.org/2003/role/labelLinkbaseRef"
        xlink:arcrole="http://www.w3.org/1999/xlink/properties/linkbase"/>
      <link:linkbaseRef xlink:type="simple" xlink:href="acme-20241231_pre.xml"
        xlink:role="http://www.xbrl.org/2003/role/presentationLinkbaseRef"
        xlink:arcrole="http://www.w3.org/1999/xlink/properties/linkbase"/>
    </xs:appinfo>
  </xs:annotation>
  <xs:element name="WidgetRevenue" type="xbrli:monetaryItemType" substitutionGroup="xbrli:item"
              xbrli:periodType="duration" xbrli:balance="credit" nillable="true"/>
</xs:schema>"#;

const CALCULATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:calculationLink xlink:type="extended" xlink:role="http://acme.example/role/IncomeStatement">
    <link:loc xlink:type="locator" xlink:href="us-gaap-2024.xsd#us-gaap_GrossProfit" xlink:label="gp"/>
    <link:loc xlink:type="locator" xlink:href="us-gaap-2024.xsd#us-gaap_Revenues" xlink:label="rev"/>
    <link:loc xlink:type="locator" xlink:href="us-gaap-2024.xsd#us-gaap_CostOfRevenue" xlink:label="cost"/>
    <link:calculationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/summation-item"
      xlink:from="gp" xlink:to="rev" weight="1.0" order="1.0"/>
    <link:calculationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/summation-item"
      xlink:from="gp" xlink:to="cost" weight="-1.0" order="2.0"/>
  </link:calculationLink>
  <link:calculationLink xlink:type="extended" xlink:role="http://acme.example/role/BalanceSheet">
    <link:loc xlink:type="locator" xlink:href="us-gaap-2024.xsd#us-gaap_LiabilitiesAndStockholdersEquity" xlink:label="le"/>
    <link:loc xlink:type="locator" xlink:href="us-gaap-2024.xsd#us-gaap_Liabilities" xlink:label="l"/>
    <link:loc xlink:type="locator" xlink:href="us-gaap-2024.xsd#us-gaap_StockholdersEquity" xlink:label="e"/>
    <link:calculationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/summation-item"
      xlink:from="le" xlink:to="l" weight="1.0" order="1.0"/>
    <link:calculationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/summation-item"
      xlink:from="le" xlink:to="e" weight="1.0" order="2.0"/>
  </link:calculationLink>
</link:linkbase>"#;

const DEFINITION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink"
    xmlns:xbrldt="http://xbrl.org/2005/xbrldt">
  <link:definitionLink xlink:type="extended" xlink:role="http://acme.example/role/Segments">
    <link:loc xlink:type="locator" xlink:href="us-gaap-2024.xsd#us-gaap_StatementTable" xlink:label="table"/>
    <link:loc xlink:type="locator" xlink:href="us-gaap-2024.xsd#us-gaap_StatementBusinessSegmentsAxis" xlink:label="axis"/>
    <link:definitionArc xlink:type="arc" xlink:arcrole="http://xbrl.org/int/dim/arcrole/hypercube-dimension"
      xlink:from="table" xlink:to="axis" order="1.0" xbrldt:closed="true"/>
  </link:definitionLink>
</link:linkbase>"#;

const LABELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:labelLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">
    <link:loc xlink:type="locator" xlink:href="us-gaap-2024.xsd#us-gaap_NetIncomeLoss" xlink:label="ni"/>
    <link:label xlink:type="resource" xlink:label="ni_lbl" xlink:role="http://www.xbrl.org/2003/role/label" xml:lang="en-US">Net income</link:label>
    <link:labelArc xlink:type="arc" xlink:from="ni" xlink:to="ni_lbl"/>
    <link:loc xlink:type="locator" xlink:href="us-gaap-2024.xsd#us-gaap_GrossProfit" xlink:label="gp"/>
    <link:label xlink:type="resource" xlink:label="gp_lbl" xlink:role="http://www.xbrl.org/2003/role/totalLabel" xml:lang="en-US">Total gross profit</link:label>
    <link:labelArc xlink:type="arc" xlink:from="gp" xlink:to="gp_lbl"/>
  </link:labelLink>
</link:linkbase>"#;

const PRESENTATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:presentationLink xlink:type="extended" xlink:role="http://acme.example/role/IncomeStatement">
    <link:loc xlink:type="locator" xlink:href="us-gaap-2024.xsd#us-gaap_GrossProfit" xlink:label="gp"/>
    <link:loc xlink:type="locator" xlink:href="us-gaap-2024.xsd#us-gaap_Revenues" xlink:label="rev"/>
    <link:loc xlink:type="locator" xlink:href="us-gaap-2024.xsd#us-gaap_CostOfRevenue" xlink:label="cost"/>
    <link:presentationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/parent-child"
      xlink:from="gp" xlink:to="rev" order="1.0"/>
    <link:presentationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/parent-child"
      xlink:from="gp" xlink:to="cost" order="2.0"/>
  </link:presentationLink>
</link:linkbase>"#;

const INSTANCE_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
    xmlns:iso4217="http://www.xbrl.org/2003/iso4217"
    xmlns:us-gaap="http://fasb.org/us-gaap/2024"
    xmlns:dei="http://xbrl.sec.gov/dei/2024">
  <xbrli:context id="FY2024">
    <xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier></xbrli:entity>
    <xbrli:period><xbrli:startDate>2024-01-01</xbrli:startDate><xbrli:endDate>2024-12-31</xbrli:endDate></xbrli:period>
  </xbrli:context>
  <xbrli:context id="FY2024I">
    <xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier></xbrli:entity>
    <xbrli:period><xbrli:instant>2024-12-31</xbrli:instant></xbrli:period>
  </xbrli:context>
  <xbrli:unit id="usd"><xbrli:measure>iso4217:USD</xbrli:measure></xbrli:unit>
  <dei:EntityRegistrantName contextRef="FY2024">Acme Corp</dei:EntityRegistrantName>
  <dei:DocumentType contextRef="FY2024">10-K</dei:DocumentType>
  <dei:DocumentPeriodEndDate contextRef="FY2024">2024-12-31</dei:DocumentPeriodEndDate>
"#;

/// Reported values of the default fixture, all in the FY2024 contexts.
pub const DURATION_FACTS: &[(&str, &str)] = &[
    ("Revenues", "1000"),
    ("CostOfRevenue", "600"),
    ("GrossProfit", "400"),
    ("OperatingExpenses", "150"),
    ("OperatingIncomeLoss", "250"),
    ("NetIncomeLoss", "200"),
    ("NetCashProvidedByUsedInOperatingActivities", "300"),
    ("NetCashProvidedByUsedInInvestingActivities", "-150"),
    ("NetCashProvidedByUsedInFinancingActivities", "-100"),
    ("CashAndCashEquivalentsPeriodIncreaseDecrease", "50"),
];

pub const INSTANT_FACTS: &[(&str, &str)] = &[
    ("Assets", "1000"),
    ("AssetsCurrent", "400"),
    ("Liabilities", "600"),
    ("StockholdersEquity", "400"),
    ("LiabilitiesAndStockholdersEquity", "1000"),
    ("CashAndCashEquivalentsAtCarryingValue", "100"),
];

pub fn instance(overrides: &[(&str, &str)]) -> String {
    let mut doc = String::from(INSTANCE_HEAD);
    let value_of = |concept: &str, default: &'static str| -> String {
        overrides
            .iter()
            .find(|(c, _)| *c == concept)
            .map(|(_, v)| v.to_string())
            .unwrap_or_else(|| default.to_string())
    };
    for (facts, context) in [(DURATION_FACTS, "FY2024"), (INSTANT_FACTS, "FY2024I")] {
        for &(concept, default) in facts {
            doc.push_str(&format!(
                "  <us-gaap:{c} contextRef=\"{ctx}\" unitRef=\"usd\" decimals=\"0\">{v}</us-gaap:{c}>\n",
                c = concept,
                ctx = context,
                v = value_of(concept, default)
            ));
        }
    }
    doc.push_str("</xbrli:xbrl>\n");
    doc
}

pub fn file_name(role: FileRole) -> String {
    match role {
        FileRole::Schema => format!("{}.xsd", PREFIX),
        other => format!("{}{}", PREFIX, other.suffix()),
    }
}

fn content(role: FileRole) -> &'static str {
    match role {
        FileRole::Schema => SCHEMA,
        FileRole::Calculation => CALCULATION,
        FileRole::Definition => DEFINITION,
        FileRole::Label => LABELS,
        FileRole::Presentation => PRESENTATION,
        FileRole::Instance => "",
    }
}

pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    /// Every document of a consistent filing.
    pub fn complete() -> Self {
        Self::with_roles(&FileRole::ALL, &[])
    }

    /// Only the listed roles are written; `overrides` replace instance values.
    pub fn with_roles(roles: &[FileRole], overrides: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for &role in roles {
            let body = match role {
                FileRole::Instance => instance(overrides),
                other => content(other).to_string(),
            };
            fs::write(dir.path().join(file_name(role)), body).unwrap();
        }
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, role: FileRole) -> PathBuf {
        self.dir.path().join(file_name(role))
    }

    pub fn write(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    /// Explicit role map over the files that exist on disk.
    pub fn files(&self) -> FilingFiles {
        FileRole::ALL
            .into_iter()
            .filter(|role| self.file(*role).is_file())
            .fold(FilingFiles::new(), |files, role| files.with(role, self.file(role)))
    }
}
