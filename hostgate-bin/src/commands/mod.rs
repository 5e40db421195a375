pub(crate) mod fetch;

pub(crate) use fetch::{Decoded, FetchResult, fetch};
