//! Problems and their test cases.
//!
//! A problem's metadata item and all of its test cases share one partition, so
//! a single query fetches everything about a problem ordered by sort key.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::keys;
use crate::schema::{FieldMap, PROBLEM_FIELDS, TESTCASE_FIELDS};
use crate::storage::{
    Condition, Entity, Index, ItemKey, RepositoryError, Result, Update, ATTR_UPDATED,
};

/// A programming problem imported from a judge platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub platform: String,
    pub problem_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit_mb: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Drafts are still being extracted; completed problems are listed publicly.
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Problem {
    /// Creates a draft problem.
    pub fn new(
        platform: impl Into<String>,
        problem_id: impl Into<String>,
        title: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            platform: platform.into(),
            problem_id: problem_id.into(),
            title: title.into(),
            description: None,
            input_format: None,
            output_format: None,
            constraints: None,
            time_limit_ms: None,
            memory_limit_mb: None,
            tags: Vec::new(),
            difficulty: None,
            source_url: None,
            is_completed: false,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn completed(mut self) -> Self {
        self.is_completed = true;
        self
    }

    pub fn item_key(platform: &str, problem_id: &str) -> Result<ItemKey> {
        Ok(ItemKey::new(
            keys::problem_pk(platform, problem_id)?,
            keys::META_SK,
        ))
    }
}

impl Entity for Problem {
    const ENTITY_TYPE: &'static str = "problem";

    fn fields() -> &'static FieldMap {
        &PROBLEM_FIELDS
    }

    fn key(&self) -> Result<ItemKey> {
        Problem::item_key(&self.platform, &self.problem_id)
    }

    fn index_keys(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                Index::Gsi1.partition_attr(),
                keys::problem_gsi1_pk(self.is_completed),
            ),
            (
                Index::Gsi1.sort_attr(),
                keys::problem_gsi1_sk(self.created_at, &self.platform, &self.problem_id),
            ),
        ]
    }
}

/// Partial update of a problem's metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProblemUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub input_format: Option<String>,
    pub output_format: Option<String>,
    pub constraints: Option<String>,
    pub time_limit_ms: Option<u64>,
    pub memory_limit_mb: Option<u64>,
    pub tags: Option<Vec<String>>,
    pub difficulty: Option<String>,
    pub is_completed: Option<bool>,
    pub metadata: Option<Value>,
}

impl ProblemUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.is_completed = Some(completed);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Builds the store update for an existing problem.
    ///
    /// Flipping `is_completed` moves the problem between the draft and
    /// completed listings in the same write.
    pub fn to_update(&self, now: i64) -> Result<Update> {
        let fields: [(&str, Option<Value>); 11] = [
            ("title", self.title.clone().map(Value::from)),
            ("description", self.description.clone().map(Value::from)),
            ("input_format", self.input_format.clone().map(Value::from)),
            ("output_format", self.output_format.clone().map(Value::from)),
            ("constraints", self.constraints.clone().map(Value::from)),
            ("time_limit_ms", self.time_limit_ms.map(Value::from)),
            ("memory_limit_mb", self.memory_limit_mb.map(Value::from)),
            ("tags", self.tags.clone().map(Value::from)),
            ("difficulty", self.difficulty.clone().map(Value::from)),
            ("is_completed", self.is_completed.map(Value::from)),
            ("metadata", self.metadata.clone()),
        ];

        let mut update = Update::new().when(Condition::item_exists());
        for (field, value) in fields {
            if let Some(value) = value {
                update = update.set(PROBLEM_FIELDS.data_path(field)?, value);
            }
        }

        if let Some(completed) = self.is_completed {
            update = update.set(
                Index::Gsi1.partition_attr(),
                keys::problem_gsi1_pk(completed),
            );
        }

        Ok(update.set(ATTR_UPDATED, now))
    }
}

/// An input/output pair, the payload of a test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub testcase_id: String,
    pub input: String,
    pub output: String,
}

impl TestCase {
    pub fn new(
        testcase_id: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            testcase_id: testcase_id.into(),
            input: input.into(),
            output: output.into(),
        }
    }
}

/// Location and sizes of a tiered payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub key: String,
    /// Uncompressed payload size in bytes.
    pub size: u64,
    pub compressed_size: u64,
}

/// A test case item as stored in the table.
///
/// Holds either the payload inline or, for large payloads, only a reference
/// to the compressed blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseRecord {
    pub platform: String,
    pub problem_id: String,
    pub testcase_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<u64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Where a test case's payload lives.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredTestCase {
    Inline(TestCase),
    Tiered { testcase_id: String, blob: BlobRef },
}

impl StoredTestCase {
    pub fn testcase_id(&self) -> &str {
        match self {
            StoredTestCase::Inline(tc) => &tc.testcase_id,
            StoredTestCase::Tiered { testcase_id, .. } => testcase_id,
        }
    }
}

impl TestCaseRecord {
    pub fn inline(platform: &str, problem_id: &str, testcase: TestCase, now: i64) -> Self {
        Self {
            platform: platform.to_string(),
            problem_id: problem_id.to_string(),
            testcase_id: testcase.testcase_id,
            input: Some(testcase.input),
            output: Some(testcase.output),
            s3_key: None,
            size: None,
            compressed_size: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tiered(
        platform: &str,
        problem_id: &str,
        testcase_id: impl Into<String>,
        blob: BlobRef,
        now: i64,
    ) -> Self {
        Self {
            platform: platform.to_string(),
            problem_id: problem_id.to_string(),
            testcase_id: testcase_id.into(),
            input: None,
            output: None,
            s3_key: Some(blob.key),
            size: Some(blob.size),
            compressed_size: Some(blob.compressed_size),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn item_key(platform: &str, problem_id: &str, testcase_id: &str) -> Result<ItemKey> {
        Ok(ItemKey::new(
            keys::problem_pk(platform, problem_id)?,
            keys::testcase_sk(testcase_id)?,
        ))
    }

    /// Classifies the record.
    ///
    /// A blob reference wins over inline fields. A record with neither is
    /// invalid data.
    pub fn storage(&self) -> Result<StoredTestCase> {
        if let Some(key) = &self.s3_key {
            return Ok(StoredTestCase::Tiered {
                testcase_id: self.testcase_id.clone(),
                blob: BlobRef {
                    key: key.clone(),
                    size: self.size.unwrap_or_default(),
                    compressed_size: self.compressed_size.unwrap_or_default(),
                },
            });
        }

        match (&self.input, &self.output) {
            (Some(input), Some(output)) => Ok(StoredTestCase::Inline(TestCase::new(
                self.testcase_id.clone(),
                input.clone(),
                output.clone(),
            ))),
            _ => Err(RepositoryError::InvalidData(format!(
                "Test case {}/{}/{} has neither inline payload nor blob reference",
                self.platform, self.problem_id, self.testcase_id
            ))),
        }
    }
}

impl Entity for TestCaseRecord {
    const ENTITY_TYPE: &'static str = "testcase";

    fn fields() -> &'static FieldMap {
        &TESTCASE_FIELDS
    }

    fn key(&self) -> Result<ItemKey> {
        TestCaseRecord::item_key(&self.platform, &self.problem_id, &self.testcase_id)
    }
}

/// Orders test case ids numerically when both parse as integers, numbers
/// before anything else, and lexicographically otherwise.
pub fn compare_testcase_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Sorts test cases by numeric id (`TC#10` after `TC#9`).
pub fn sort_testcases(testcases: &mut [TestCase]) {
    testcases.sort_by(|a, b| compare_testcase_ids(&a.testcase_id, &b.testcase_id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{from_item, to_item};
    use serde_json::json;

    #[test]
    fn test_problem_envelope() {
        let problem = Problem::new("baekjoon", "1000", "A+B", 1_700_000_000)
            .with_tags(vec!["math".to_string()]);
        let item = to_item(&problem).unwrap();

        assert_eq!(item["PK"], json!("PROB#baekjoon#1000"));
        assert_eq!(item["SK"], json!("META"));
        assert_eq!(item["GSI1PK"], json!("PROB#STATUS#DRAFT"));
        assert_eq!(item["GSI1SK"], json!("00000000001700000000#baekjoon#1000"));
        assert_eq!(item["dat"]["ti"], json!("A+B"));
        assert_eq!(item["dat"]["tg"], json!(["math"]));
        assert_eq!(from_item::<Problem>(&item).unwrap(), problem);
    }

    #[test]
    fn test_problem_update_moves_listing() {
        let problem = Problem::new("baekjoon", "1000", "A+B", 10);
        let mut item = to_item(&problem).unwrap();
        ProblemUpdate::new()
            .with_completed(true)
            .with_title("A plus B")
            .to_update(20)
            .unwrap()
            .apply(&mut item)
            .unwrap();

        assert_eq!(item["GSI1PK"], json!("PROB#STATUS#COMPLETED"));
        let updated: Problem = from_item(&item).unwrap();
        assert!(updated.is_completed);
        assert_eq!(updated.title, "A plus B");
        assert_eq!(updated.updated_at, 20);
    }

    #[test]
    fn test_testcase_record_storage() {
        let inline = TestCaseRecord::inline("baekjoon", "1000", TestCase::new("1", "1 2", "3"), 1);
        assert_eq!(
            inline.storage().unwrap(),
            StoredTestCase::Inline(TestCase::new("1", "1 2", "3"))
        );

        let blob = BlobRef {
            key: "testcases/baekjoon/1000/tc_2.json.gz".to_string(),
            size: 200_000,
            compressed_size: 1_000,
        };
        let tiered = TestCaseRecord::tiered("baekjoon", "1000", "2", blob.clone(), 1);
        let item = to_item(&tiered).unwrap();
        assert_eq!(item["SK"], json!("TC#2"));
        assert_eq!(item["dat"]["s3_key"], json!(blob.key));
        assert!(item["dat"].get("i").is_none());
        assert_eq!(
            from_item::<TestCaseRecord>(&item).unwrap().storage().unwrap(),
            StoredTestCase::Tiered {
                testcase_id: "2".to_string(),
                blob
            }
        );
    }

    #[test]
    fn test_empty_output_is_kept_inline() {
        let record = TestCaseRecord::inline("p", "1", TestCase::new("1", "0", ""), 1);
        let item = to_item(&record).unwrap();
        assert_eq!(item["dat"]["o"], json!(""));
    }

    #[test]
    fn test_record_without_payload_is_invalid() {
        let mut record = TestCaseRecord::inline("p", "1", TestCase::new("1", "a", "b"), 1);
        record.output = None;
        assert!(matches!(
            record.storage(),
            Err(RepositoryError::InvalidData(_))
        ));
    }

    #[test]
    fn test_sort_testcases_numeric() {
        let mut cases = vec![
            TestCase::new("10", "", ""),
            TestCase::new("2", "", ""),
            TestCase::new("sample", "", ""),
            TestCase::new("1", "", ""),
        ];
        sort_testcases(&mut cases);
        let ids: Vec<&str> = cases.iter().map(|c| c.testcase_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "10", "sample"]);
    }
}
