//! Named query templates over the `books` collection
//!
//! Each function builds the store expression for one catalog operation;
//! [`BookCatalog`](super::BookCatalog) runs them.

use crate::engine::nosql::{
    Filter, FindQuery, GroupStage, Pipeline, SortKey, TextIndexSpec, Update,
};

/// Field the relevance score is written to in search results
pub const SCORE_FIELD: &str = "score";

pub fn all_books() -> FindQuery {
    FindQuery::new(Filter::all())
}

pub fn by_author(author: &str) -> FindQuery {
    FindQuery::new(Filter::eq("author", author))
}

pub fn in_stock_filter() -> Filter {
    Filter::eq("in_stock", true)
}

pub fn in_stock() -> FindQuery {
    FindQuery::new(in_stock_filter())
}

/// Inclusive year range, oldest first
pub fn published_between(min_year: i32, max_year: i32) -> FindQuery {
    FindQuery::new(Filter::between("published_year", min_year, max_year))
        .sort(SortKey::asc("published_year"))
}

/// Unanchored, case-insensitive title match
pub fn title_matching(pattern: &str) -> FindQuery {
    FindQuery::new(Filter::regex("title", pattern, true))
}

pub fn title_is(title: &str) -> Filter {
    Filter::eq("title", title)
}

pub fn set_price(price: f64) -> Update {
    Update::new().set("price", price)
}

/// Per genre: mean price, book count and page total, cheapest genre first
pub fn genre_summary() -> Pipeline {
    Pipeline::new()
        .group(
            GroupStage::by("genre")
                .avg("averagePrice", "price")
                .count("bookCount")
                .sum("totalPages", "pages"),
        )
        .sort(vec![SortKey::asc("averagePrice")])
}

/// Authors with more than one book, priciest average first
pub fn prolific_authors() -> Pipeline {
    Pipeline::new()
        .group(
            GroupStage::by("author")
                .count("bookCount")
                .push("books", "title")
                .avg("avgPrice", "price"),
        )
        .filter(Filter::gt("bookCount", 1))
        .sort(vec![SortKey::desc("avgPrice")])
}

/// Free-text index over title, author and description
pub fn text_index() -> TextIndexSpec {
    TextIndexSpec::new()
        .field("title")
        .field("author")
        .field("description")
}

/// Text search, most relevant first, scores attached
pub fn search(text: &str) -> FindQuery {
    FindQuery::new(Filter::text(text))
        .with_score(SCORE_FIELD)
        .sort(SortKey::TextScore)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::nosql::Stage;

    #[test]
    fn test_year_range_shape() {
        let query = published_between(1939, 1970);
        assert_eq!(query.filter, Filter::between("published_year", 1939, 1970));
        assert_eq!(query.sort, vec![SortKey::asc("published_year")]);
    }

    #[test]
    fn test_sort_is_a_pipeline_stage() {
        let pipeline = genre_summary();
        assert!(matches!(pipeline.stages.last(), Some(Stage::Sort(_))));
        assert!(pipeline.validate().is_ok());
        assert!(prolific_authors().validate().is_ok());
    }

    #[test]
    fn test_search_sorts_by_score() {
        let query = search("brave dystopian");
        assert_eq!(query.sort, vec![SortKey::TextScore]);
        assert_eq!(query.score_field.as_deref(), Some(SCORE_FIELD));
    }
}
