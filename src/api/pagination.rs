use serde::{Deserialize, Serialize};

pub(crate) const fn default_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
}

impl ListQuery {
    /// Clamps client-supplied paging values to sane bounds.
    pub(crate) fn window(&self) -> (i64, i64) {
        (self.skip.max(0), self.limit.clamp(1, 500))
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PaginatedResponse<T> {
    pub(crate) items: Vec<T>,
    pub(crate) total_count: i64,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

#[cfg(test)]
mod tests {
    use super::ListQuery;

    #[test]
    fn window_clamps_out_of_range_values() {
        assert_eq!(ListQuery { skip: -5, limit: 0 }.window(), (0, 1));
        assert_eq!(ListQuery { skip: 10, limit: 9000 }.window(), (10, 500));
        assert_eq!(ListQuery { skip: 0, limit: 100 }.window(), (0, 100));
    }
}
