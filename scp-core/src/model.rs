pub mod accession;
pub mod annotation;
pub mod cluster;
pub mod data_array;
pub mod expression;
pub mod file;
pub mod metadata;
pub mod project;
pub mod study;
pub mod user_annotation;

pub trait Endpoint {
    fn endpoint() -> String;
}

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, serde::Deserialize, valuable::Valuable)]
#[serde(default)]
pub struct Pagination {
    pub page: usize,
    pub per_page: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    #[must_use]
    pub fn paginate<T>(&self, items: Vec<T>) -> Vec<T> {
        let Self { page, per_page } = *self;
        let skip = page.saturating_sub(1).saturating_mul(per_page);

        items.into_iter().skip(skip).take(per_page).collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::Pagination;

    #[test]
    fn pages_are_one_indexed() {
        let items: Vec<_> = (0..25).collect();

        let second = Pagination { page: 2, per_page: 10 }.paginate(items.clone());
        assert_eq!(second, (10..20).collect::<Vec<_>>());

        let zeroth = Pagination { page: 0, per_page: 10 }.paginate(items.clone());
        assert_eq!(zeroth, (0..10).collect::<Vec<_>>());

        let past_end = Pagination { page: 4, per_page: 10 }.paginate(items);
        assert!(past_end.is_empty());
    }
}
