use std::collections::HashMap;

use bson::{Bson, Document};

use super::error::{Error, Result};

#[derive(Default, Debug)]
pub struct MemoryDb {
    collections: HashMap<String, Vec<Document>>,
}

/// Resolves a dotted path such as `hashed_api_key.prefix`.
fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;

    for part in parts {
        current = current.as_document()?.get(part)?;
    }

    Some(current)
}

fn as_number(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int64(n) => Some(*n),
        Bson::Int32(n) => Some(i64::from(*n)),
        _ => None,
    }
}

/// Supports `$ne`, `$lt` and `$lte`. A missing field matches only `$ne`.
fn matches_operator(found: Option<&Bson>, operator: &str, operand: &Bson) -> bool {
    let compare = |f: fn(i64, i64) -> bool| {
        found
            .and_then(as_number)
            .zip(as_number(operand))
            .is_some_and(|(a, b)| f(a, b))
    };

    match operator {
        "$ne" => found != Some(operand),
        "$lt" => compare(|a, b| a < b),
        "$lte" => compare(|a, b| a <= b),
        _ => false,
    }
}

fn matches_condition(found: Option<&Bson>, condition: &Bson) -> bool {
    match condition {
        Bson::Document(operators) if operators.keys().all(|k| k.starts_with('$')) && !operators.is_empty() => {
            operators.iter().all(|(op, operand)| matches_operator(found, op, operand))
        }
        value => found == Some(value),
    }
}

fn matches(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| matches_condition(lookup(document, key), condition))
}

fn bson_to_string(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl MemoryDb {
    fn check_unique<'a>(
        existing: impl Iterator<Item = &'a Document> + Clone,
        collection: &str,
        unique: &[&str],
        document: &Document,
    ) -> Result<()> {
        for field in unique {
            let Some(value) = lookup(document, field).filter(|v| !matches!(v, Bson::Null)) else {
                continue;
            };

            if existing.clone().any(|d| lookup(d, field) == Some(value)) {
                return Err(Error::DuplicateRecord {
                    entity: collection.to_string(),
                    field: Some((*field).to_string()),
                    value: Some(bson_to_string(value)),
                });
            }
        }

        Ok(())
    }

    pub fn insert_many(&mut self, collection: &str, unique: &[&str], documents: Vec<Document>) -> Result<()> {
        let stored = self.collections.entry(collection.to_string()).or_default();

        for (i, document) in documents.iter().enumerate() {
            Self::check_unique(stored.iter().chain(&documents[..i]), collection, unique, document)?;
        }

        stored.extend(documents);

        Ok(())
    }

    pub fn find(&self, collection: &str, filter: &Document) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches(d, filter)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn replace(&mut self, collection: &str, unique: &[&str], filter: &Document, document: Document) -> Result<()> {
        let stored = self.collections.entry(collection.to_string()).or_default();

        let Some(index) = stored.iter().position(|d| matches(d, filter)) else {
            return Err(Error::RecordNotFound);
        };

        let others = stored
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != index)
            .map(|(_, d)| d);
        Self::check_unique(others, collection, unique, &document)?;

        stored[index] = document;

        Ok(())
    }

    pub fn take(&mut self, collection: &str, filter: &Document) -> Option<Document> {
        let stored = self.collections.get_mut(collection)?;
        let index = stored.iter().position(|d| matches(d, filter))?;

        Some(stored.remove(index))
    }

    /// Sets `fields` on every record matching `filter` and returns how many matched.
    pub fn set(&mut self, collection: &str, filter: &Document, fields: &Document) -> u64 {
        let Some(stored) = self.collections.get_mut(collection) else {
            return 0;
        };

        let mut matched = 0;
        for document in stored.iter_mut().filter(|d| matches(d, filter)) {
            for (key, value) in fields {
                document.insert(key.clone(), value.clone());
            }
            matched += 1;
        }

        matched
    }

    pub fn increment(&mut self, collection: &str, filter: &Document, field: &str, by: i64) -> i64 {
        let stored = self.collections.entry(collection.to_string()).or_default();

        let index = match stored.iter().position(|d| matches(d, filter)) {
            Some(index) => index,
            None => {
                stored.push(filter.clone());
                stored.len() - 1
            }
        };

        Self::add(&mut stored[index], field, by)
    }

    /// Like [`Self::increment`], but leaves the collection alone when nothing matches.
    pub fn increment_existing(&mut self, collection: &str, filter: &Document, field: &str, by: i64) -> Option<i64> {
        let stored = self.collections.get_mut(collection)?;
        let document = stored.iter_mut().find(|d| matches(d, filter))?;

        Some(Self::add(document, field, by))
    }

    fn add(document: &mut Document, field: &str, by: i64) -> i64 {
        let current = lookup(document, field).and_then(as_number).unwrap_or(0);
        let next = current + by;
        document.insert(field, Bson::Int64(next));

        next
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn unique_fields_are_enforced() {
        let mut db = MemoryDb::default();
        db.insert_many("studies", &["name"], vec![doc! {"name": "a"}]).unwrap();

        let err = db
            .insert_many("studies", &["name"], vec![doc! {"name": "b"}, doc! {"name": "a"}])
            .unwrap_err();

        assert_eq!(
            err,
            Error::DuplicateRecord {
                entity: "studies".to_string(),
                field: Some("name".to_string()),
                value: Some("a".to_string()),
            }
        );
        assert_eq!(db.find("studies", &doc! {}).len(), 1);
    }

    #[test]
    fn counters_start_at_one() {
        let mut db = MemoryDb::default();

        assert_eq!(db.increment("counters", &doc! {"name": "x"}, "seq", 1), 1);
        assert_eq!(db.increment("counters", &doc! {"name": "x"}, "seq", 1), 2);
        assert_eq!(db.increment("counters", &doc! {"name": "y"}, "seq", 5), 5);
    }

    #[test]
    fn operator_filters() {
        let mut db = MemoryDb::default();
        db.insert_many(
            "users",
            &[],
            vec![doc! {"name": "a", "used": 5_i64}, doc! {"name": "b", "used": 50_i64}, doc! {"name": "c"}],
        )
        .unwrap();

        let names = |filter: Document| -> Vec<String> {
            db.find("users", &filter)
                .iter()
                .map(|d| d.get_str("name").unwrap().to_string())
                .collect()
        };

        assert_eq!(names(doc! {"used": {"$lt": 50_i64}}), ["a"]);
        assert_eq!(names(doc! {"used": {"$lte": 50_i64}}), ["a", "b"]);
        assert_eq!(names(doc! {"used": {"$ne": 5_i64}}), ["b", "c"]);
    }

    #[test]
    fn increment_existing_never_inserts() {
        let mut db = MemoryDb::default();
        db.insert_many("users", &[], vec![doc! {"name": "a", "used": 1_i64}]).unwrap();

        assert_eq!(db.increment_existing("users", &doc! {"name": "a"}, "used", 2), Some(3));
        assert_eq!(db.increment_existing("users", &doc! {"name": "z"}, "used", 2), None);
        assert_eq!(db.set("users", &doc! {"name": "a"}, &doc! {"used": 0_i64}), 1);
        assert_eq!(db.find("users", &doc! {}).len(), 1);
    }

    #[test]
    fn take_removes() {
        let mut db = MemoryDb::default();
        db.insert_many("totats", &[], vec![doc! {"token": "t"}]).unwrap();

        assert!(db.take("totats", &doc! {"token": "t"}).is_some());
        assert!(db.take("totats", &doc! {"token": "t"}).is_none());
    }
}
