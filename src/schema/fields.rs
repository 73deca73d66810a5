//! Semantic field tables.
//!
//! Every semantic field has one ordered list of case-insensitive regex patterns covering every
//! era in which it has appeared; the first pattern that matches any header wins. New eras extend
//! these lists instead of adding control flow. Which fields are *active* for a given extract is
//! decided by its [`crate::schema::era::EraDescriptor`].

use serde::{Deserialize, Serialize};

use crate::types::DatasetKind;

/// Name of the entity-total field.
pub const TOTAL: &str = "total";

pub const DISTRICT_ID: &str = "district_id";
pub const DISTRICT_NAME: &str = "district_name";
pub const SCHOOL_ID: &str = "school_id";
pub const SCHOOL_NAME: &str = "school_name";

/// Tidy-pivot group a field belongs to. Groups are pivoted independently, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    /// Entity totals and other base counts (assessment tested counts).
    Total,
    /// Race/ethnicity counts.
    Demographic,
    /// Counts derived from a percentage (gender, special populations, achievement levels).
    Derived,
    /// Grade or grade-band counts.
    Grade,
    /// Text attributes; never pivoted.
    Attribute,
}

impl FieldGroup {
    /// The numeric groups, in pivot order.
    pub const PIVOT_ORDER: [FieldGroup; 4] = [Self::Total, Self::Demographic, Self::Derived, Self::Grade];
}

/// How a field's cells are encoded in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain numeric count.
    Count,
    /// Percentage of another field (`base`); a count is derived from it.
    Percent { base: &'static str },
    /// Free text.
    Text,
}

/// One semantic field and its header patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub group: FieldGroup,
    pub kind: FieldKind,
    /// External label used by the tidy pivot.
    pub label: &'static str,
    pub patterns: &'static [&'static str],
}

const fn count(name: &'static str, group: FieldGroup, label: &'static str, patterns: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        name,
        group,
        kind: FieldKind::Count,
        label,
        patterns,
    }
}

const fn percent(name: &'static str, base: &'static str, patterns: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        name,
        group: FieldGroup::Derived,
        kind: FieldKind::Percent { base },
        label: name,
        patterns,
    }
}

const fn text(name: &'static str, patterns: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        name,
        group: FieldGroup::Attribute,
        kind: FieldKind::Text,
        label: name,
        patterns,
    }
}

/// Identity columns shared by every dataset.
pub static IDENTITY_FIELDS: &[FieldSpec] = &[
    text(
        DISTRICT_ID,
        &[
            r"^(School\s*System|LEA|District|Sch\s*Sys)(\s*(Code|Cd|ID|Number))?$",
            r"^SchSys$",
            r"^Parish\s*Code$",
        ],
    ),
    text(
        DISTRICT_NAME,
        &[
            r"^(School\s*System|LEA|District|Sch\s*Sys)\s*Name$",
            r"^Parish\s*Name$",
        ],
    ),
    text(
        SCHOOL_ID,
        &[r"^(Site|School)\s*(Code|Cd|ID|Number)$", r"^SiteCd$", r"^Site$"],
    ),
    text(SCHOOL_NAME, &[r"^(Site|School)\s*Name$", r"^SiteName$"]),
];

/// Sheet-name patterns for workbooks that split entity levels across sheets.
pub static DISTRICT_SHEET_PATTERNS: &[&str] = &[
    r"^Total\s*by\s*(School\s*System|LEA|District)",
    r"(School\s*System|LEA|District)s?$",
];

pub static SCHOOL_SHEET_PATTERNS: &[&str] = &[
    r"^Total\s*by\s*(Site|School)$",
    r"by\s*Site",
    r"^(Sites?|Schools?)$",
];

pub static ENROLLMENT_FIELDS: &[FieldSpec] = &[
    count(
        TOTAL,
        FieldGroup::Total,
        "total_enrollment",
        &[
            r"^Total\s*(Students|Enrollment)$",
            r"^Total\s*Enr",
            r"^Enrollment$",
            r"^Total$",
        ],
    ),
    // Race/ethnicity
    count(
        "american_indian",
        FieldGroup::Demographic,
        "native_american",
        &[
            r"^Am(erican)?\s*Ind(ian)?$",
            r"^American\s*Indian\s*(/|or)?\s*Alaska(n)?\s*Native$",
            r"^Native\s*American$",
        ],
    ),
    count("asian", FieldGroup::Demographic, "asian", &[r"^Asian$"]),
    count(
        "black",
        FieldGroup::Demographic,
        "black",
        &[r"^Black$", r"^African.*American$", r"^Black\s*or\s*African\s*American$"],
    ),
    count(
        "hispanic",
        FieldGroup::Demographic,
        "hispanic",
        &[r"^Hispanic$", r"^Hispanic\s*(/|or)\s*Latino$"],
    ),
    count(
        "pacific_islander",
        FieldGroup::Demographic,
        "pacific_islander",
        &[
            r"^Haw(aiian)?\s*/?\s*P(acific)?\s*I(slander)?$",
            r"^Native\s*Hawaiian",
            r"^Pacific\s*Islander$",
        ],
    ),
    count("white", FieldGroup::Demographic, "white", &[r"^White$"]),
    count(
        "multiracial",
        FieldGroup::Demographic,
        "multiracial",
        &[r"^Multiple\s*Races?$", r"^Multi[\s-]?racial$", r"^Two\s*or\s*More\s*Races$"],
    ),
    // Percentage-encoded populations
    percent(
        "female",
        TOTAL,
        &[
            r"^Female\s*%$",
            r"^%\s*Female$",
            r"^(Pct|Percent)\s*Female$",
            r"^Female\s*Percent$",
            r"^Female$",
        ],
    ),
    percent(
        "male",
        TOTAL,
        &[
            r"^Male\s*%$",
            r"^%\s*Male$",
            r"^(Pct|Percent)\s*Male$",
            r"^Male\s*Percent$",
            r"^Male$",
        ],
    ),
    percent(
        "minority",
        TOTAL,
        &[r"^Minority\s*%$", r"^%\s*Minority$", r"^Minority$"],
    ),
    percent(
        "lep",
        TOTAL,
        &[
            r"^LEP\s*%$",
            r"^%\s*LEP$",
            r"^LEP$",
            r"^(Limited\s*English\s*Proficien(t|cy)|English\s*Learners?)\s*%?$",
        ],
    ),
    percent(
        "econ_disadv",
        TOTAL,
        &[
            r"^Econ(omically)?\.?\s*Disadv(antaged)?\.?\s*%$",
            r"^%\s*Econ(omically)?\.?\s*Disadv",
            r"^Econ(omically)?\.?\s*Disadv(antaged)?\.?$",
        ],
    ),
    percent(
        "swd",
        TOTAL,
        &[
            r"^(SWD|Students\s*with\s*Disabilities)\s*%$",
            r"^%\s*SWD$",
            r"^(SWD|Students\s*with\s*Disabilities)$",
        ],
    ),
    // Grades
    count("infants", FieldGroup::Grade, "IN", &[r"^Infants?$"]),
    count(
        "pre_k",
        FieldGroup::Grade,
        "PK",
        &[r"^Pre-?K$", r"^PK$", r"^Pre-?Kindergarten$"],
    ),
    count(
        "kindergarten",
        FieldGroup::Grade,
        "K",
        &[r"^K$", r"^KG$", r"^Kindergarten$"],
    ),
    count("grade_01", FieldGroup::Grade, "01", &[r"^(Grade\s*|Gr\.?\s*)?0?1$"]),
    count("grade_02", FieldGroup::Grade, "02", &[r"^(Grade\s*|Gr\.?\s*)?0?2$"]),
    count("grade_03", FieldGroup::Grade, "03", &[r"^(Grade\s*|Gr\.?\s*)?0?3$"]),
    count("grade_04", FieldGroup::Grade, "04", &[r"^(Grade\s*|Gr\.?\s*)?0?4$"]),
    count("grade_05", FieldGroup::Grade, "05", &[r"^(Grade\s*|Gr\.?\s*)?0?5$"]),
    count("grade_06", FieldGroup::Grade, "06", &[r"^(Grade\s*|Gr\.?\s*)?0?6$"]),
    count("grade_07", FieldGroup::Grade, "07", &[r"^(Grade\s*|Gr\.?\s*)?0?7$"]),
    count("grade_08", FieldGroup::Grade, "08", &[r"^(Grade\s*|Gr\.?\s*)?0?8$"]),
    count("grade_09", FieldGroup::Grade, "09", &[r"^(Grade\s*|Gr\.?\s*)?0?9$"]),
    count("grade_10", FieldGroup::Grade, "10", &[r"^(Grade\s*|Gr\.?\s*)?10$"]),
    count("grade_11", FieldGroup::Grade, "11", &[r"^(Grade\s*|Gr\.?\s*)?11$"]),
    count("grade_12", FieldGroup::Grade, "12", &[r"^(Grade\s*|Gr\.?\s*)?12$"]),
    count(
        "grade_t9",
        FieldGroup::Grade,
        "T9",
        &[r"^(Grade\s*)?T-?9$", r"^Transitional\s*9(th)?"],
    ),
    count(
        "extension_academy",
        FieldGroup::Grade,
        "EA",
        &[r"^Ext(ension)?\.?\s*Acad(emy)?$", r"^EA$"],
    ),
    // Grade bands (pre-2020 layout)
    count(
        "grades_01_05",
        FieldGroup::Grade,
        "01-05",
        &[r"^(Grades?\s*)?0?1\s*-\s*0?5$"],
    ),
    count(
        "grades_06_08",
        FieldGroup::Grade,
        "06-08",
        &[r"^(Grades?\s*)?0?6\s*-\s*0?8$"],
    ),
    count(
        "grades_09_12",
        FieldGroup::Grade,
        "09-12",
        &[r"^(Grades?\s*)?0?9\s*-\s*12$"],
    ),
];

pub static ASSESSMENT_FIELDS: &[FieldSpec] = &[
    // English language arts
    count(
        "ela_tested",
        FieldGroup::Total,
        "ela_tested",
        &[
            r"^ELA\s*(N|Number|#)?\s*Tested$",
            r"^(English\s*Language\s*Arts|English)\s*(N|Number|#)?\s*Tested$",
        ],
    ),
    percent(
        "ela_advanced",
        "ela_tested",
        &[r"^(ELA|English\s*Language\s*Arts|English)\s*(%\s*)?Advanced(\s*%)?$"],
    ),
    percent(
        "ela_mastery",
        "ela_tested",
        &[r"^(ELA|English\s*Language\s*Arts|English)\s*(%\s*)?Mastery(\s*%)?$"],
    ),
    percent(
        "ela_basic",
        "ela_tested",
        &[r"^(ELA|English\s*Language\s*Arts|English)\s*(%\s*)?Basic(\s*%)?$"],
    ),
    percent(
        "ela_approaching_basic",
        "ela_tested",
        &[r"^(ELA|English\s*Language\s*Arts|English)\s*(%\s*)?Approaching\s*Basic(\s*%)?$"],
    ),
    percent(
        "ela_unsatisfactory",
        "ela_tested",
        &[r"^(ELA|English\s*Language\s*Arts|English)\s*(%\s*)?Unsatisfactory(\s*%)?$"],
    ),
    // Mathematics
    count(
        "math_tested",
        FieldGroup::Total,
        "math_tested",
        &[r"^Math(ematics)?\s*(N|Number|#)?\s*Tested$"],
    ),
    percent(
        "math_advanced",
        "math_tested",
        &[r"^Math(ematics)?\s*(%\s*)?Advanced(\s*%)?$"],
    ),
    percent(
        "math_mastery",
        "math_tested",
        &[r"^Math(ematics)?\s*(%\s*)?Mastery(\s*%)?$"],
    ),
    percent(
        "math_basic",
        "math_tested",
        &[r"^Math(ematics)?\s*(%\s*)?Basic(\s*%)?$"],
    ),
    percent(
        "math_approaching_basic",
        "math_tested",
        &[r"^Math(ematics)?\s*(%\s*)?Approaching\s*Basic(\s*%)?$"],
    ),
    percent(
        "math_unsatisfactory",
        "math_tested",
        &[r"^Math(ematics)?\s*(%\s*)?Unsatisfactory(\s*%)?$"],
    ),
    // Science
    count(
        "science_tested",
        FieldGroup::Total,
        "science_tested",
        &[r"^Science\s*(N|Number|#)?\s*Tested$"],
    ),
    percent(
        "science_advanced",
        "science_tested",
        &[r"^Science\s*(%\s*)?Advanced(\s*%)?$"],
    ),
    percent(
        "science_mastery",
        "science_tested",
        &[r"^Science\s*(%\s*)?Mastery(\s*%)?$"],
    ),
    percent(
        "science_basic",
        "science_tested",
        &[r"^Science\s*(%\s*)?Basic(\s*%)?$"],
    ),
    percent(
        "science_approaching_basic",
        "science_tested",
        &[r"^Science\s*(%\s*)?Approaching\s*Basic(\s*%)?$"],
    ),
    percent(
        "science_unsatisfactory",
        "science_tested",
        &[r"^Science\s*(%\s*)?Unsatisfactory(\s*%)?$"],
    ),
    // Social studies (from 2021)
    count(
        "social_studies_tested",
        FieldGroup::Total,
        "social_studies_tested",
        &[r"^(Social\s*Studies|SS)\s*(N|Number|#)?\s*Tested$"],
    ),
    percent(
        "social_studies_advanced",
        "social_studies_tested",
        &[r"^(Social\s*Studies|SS)\s*(%\s*)?Advanced(\s*%)?$"],
    ),
    percent(
        "social_studies_mastery",
        "social_studies_tested",
        &[r"^(Social\s*Studies|SS)\s*(%\s*)?Mastery(\s*%)?$"],
    ),
    percent(
        "social_studies_basic",
        "social_studies_tested",
        &[r"^(Social\s*Studies|SS)\s*(%\s*)?Basic(\s*%)?$"],
    ),
    percent(
        "social_studies_approaching_basic",
        "social_studies_tested",
        &[r"^(Social\s*Studies|SS)\s*(%\s*)?Approaching\s*Basic(\s*%)?$"],
    ),
    percent(
        "social_studies_unsatisfactory",
        "social_studies_tested",
        &[r"^(Social\s*Studies|SS)\s*(%\s*)?Unsatisfactory(\s*%)?$"],
    ),
];

pub static DIRECTORY_FIELDS: &[FieldSpec] = &[
    text(
        "address",
        &[r"^(Street|Mailing|Physical)?\s*Address(\s*1)?$", r"^Street$"],
    ),
    text("city", &[r"^City$"]),
    text("state", &[r"^State$", r"^ST$"]),
    text("zip", &[r"^Zip(\s*Code)?$", r"^Postal\s*Code$"]),
    text("phone", &[r"^(Phone|Telephone)(\s*Number)?$"]),
    text(
        "grades_served",
        &[r"^Grades?\s*(Served|Span|Offered)$", r"^Grade\s*Range$"],
    ),
    text("school_type", &[r"^(School|Site)\s*Type$", r"^Type$"]),
    text(
        "principal",
        &[r"^Principal(\s*Name)?$", r"^(School\s*)?Leader(\s*Name)?$"],
    ),
];

/// Field table plus cross-field rules for one dataset.
#[derive(Debug)]
pub struct DatasetSchema {
    pub kind: DatasetKind,
    pub fields: &'static [FieldSpec],
    /// Groups of percentages that should sum to ~100 when all are present.
    pub complements: &'static [&'static [&'static str]],
}

impl DatasetSchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

static ENROLLMENT_SCHEMA: DatasetSchema = DatasetSchema {
    kind: DatasetKind::Enrollment,
    fields: ENROLLMENT_FIELDS,
    complements: &[&["female", "male"]],
};

static ASSESSMENT_SCHEMA: DatasetSchema = DatasetSchema {
    kind: DatasetKind::Assessment,
    fields: ASSESSMENT_FIELDS,
    complements: &[
        &[
            "ela_advanced",
            "ela_mastery",
            "ela_basic",
            "ela_approaching_basic",
            "ela_unsatisfactory",
        ],
        &[
            "math_advanced",
            "math_mastery",
            "math_basic",
            "math_approaching_basic",
            "math_unsatisfactory",
        ],
        &[
            "science_advanced",
            "science_mastery",
            "science_basic",
            "science_approaching_basic",
            "science_unsatisfactory",
        ],
        &[
            "social_studies_advanced",
            "social_studies_mastery",
            "social_studies_basic",
            "social_studies_approaching_basic",
            "social_studies_unsatisfactory",
        ],
    ],
};

static DIRECTORY_SCHEMA: DatasetSchema = DatasetSchema {
    kind: DatasetKind::Directory,
    fields: DIRECTORY_FIELDS,
    complements: &[],
};

/// The field table for a dataset.
pub fn dataset_schema(kind: DatasetKind) -> &'static DatasetSchema {
    match kind {
        DatasetKind::Enrollment => &ENROLLMENT_SCHEMA,
        DatasetKind::Assessment => &ASSESSMENT_SCHEMA,
        DatasetKind::Directory => &DIRECTORY_SCHEMA,
    }
}
