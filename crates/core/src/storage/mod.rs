mod envelope;
mod error;
mod expression;
mod traits;
mod types;

pub use envelope::{from_item, timestamp, to_item, Entity};
pub use error::{RepositoryError, Result};
pub use expression::{
    AttrPath, Condition, ExpressionBuilder, Query, SortCondition, Update, UpdateAction,
};
pub use traits::{BlobStore, ItemStore};
pub use types::{
    Index, Item, ItemKey, WriteOutcome, WriteRequest, ATTR_CREATED, ATTR_DATA, ATTR_PK, ATTR_SK,
    ATTR_TTL, ATTR_TYPE, ATTR_UPDATED, MAX_BATCH_WRITE,
};
