use std::io::{self, Write};

use crate::entity::{CanonicalEntity, EntityType};
use crate::relationship::Assertion;

pub const ENTITY_HEADER: &[&str] = &["entity_id", "type", "text", "normalized", "confidence", "sources"];

pub const LOCATION_HEADER: &[&str] = &[
    "entity_id",
    "latitude",
    "longitude",
    "display_name",
    "location_type",
    "importance",
    "bbox_south",
    "bbox_north",
    "bbox_west",
    "bbox_east",
];

pub const TIMEPERIOD_HEADER: &[&str] = &[
    "entity_id",
    "precision",
    "time_type",
    "start_date",
    "end_date",
    "date_reliability",
];

pub const RELATION_HEADER: &[&str] = &[
    "relation_id",
    "subject_id",
    "object_id",
    "predicate",
    "confidence",
    "sources",
    "context_time_id",
    "context_location_id",
];

/// RFC 4180 record writer. Fields containing a comma, quote or line break are
/// quoted, with inner quotes doubled.
pub struct CsvWriter<W: Write> {
    inner: W,
}

impl<W: Write> CsvWriter<W> {
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_record<S: AsRef<str>>(&mut self, fields: &[S]) -> io::Result<()> {
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                self.inner.write_all(b",")?;
            }
            let field = field.as_ref();
            if field.contains([',', '"', '\n', '\r']) {
                write!(self.inner, "\"{}\"", field.replace('"', "\"\""))?;
            } else {
                self.inner.write_all(field.as_bytes())?;
            }
        }
        self.inner.write_all(b"\n")
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn write_entities<W: Write>(
    out: &mut CsvWriter<W>,
    entities: &[CanonicalEntity],
    delimiter: &str,
) -> io::Result<usize> {
    out.write_record(ENTITY_HEADER)?;
    for entity in entities {
        out.write_record(&[
            entity.entity_id.to_string(),
            entity.entity_type.to_string(),
            entity.text.clone(),
            entity.normalized.clone(),
            entity.confidence.to_string(),
            entity.sources_joined(delimiter),
        ])?;
    }
    Ok(entities.len())
}

/// One row per LOCATION entity. Entities that could not be geocoded get a row
/// with empty attribute columns.
pub fn write_locations<W: Write>(
    out: &mut CsvWriter<W>,
    entities: &[CanonicalEntity],
) -> io::Result<usize> {
    out.write_record(LOCATION_HEADER)?;
    let mut rows = 0;
    for entity in entities.iter().filter(|e| e.entity_type == EntityType::Location) {
        let spatial = entity.spatial().cloned().unwrap_or_default();
        let bbox = spatial.bounding_box;
        out.write_record(&[
            entity.entity_id.to_string(),
            opt(spatial.latitude),
            opt(spatial.longitude),
            spatial.display_name.unwrap_or_default(),
            spatial.location_type.unwrap_or_default(),
            opt(spatial.importance),
            opt(bbox.map(|b| b.south)),
            opt(bbox.map(|b| b.north)),
            opt(bbox.map(|b| b.west)),
            opt(bbox.map(|b| b.east)),
        ])?;
        rows += 1;
    }
    Ok(rows)
}

/// One row per TIME entity; unresolved ones are UNKNOWN with empty dates.
pub fn write_timeperiods<W: Write>(
    out: &mut CsvWriter<W>,
    entities: &[CanonicalEntity],
) -> io::Result<usize> {
    out.write_record(TIMEPERIOD_HEADER)?;
    let mut rows = 0;
    for entity in entities.iter().filter(|e| e.entity_type == EntityType::Time) {
        let row = match entity.temporal() {
            Some(t) => [
                entity.entity_id.to_string(),
                t.precision.as_str().to_string(),
                t.time_type.as_str().to_string(),
                opt(t.start_date),
                opt(t.end_date),
                t.date_reliability.to_string(),
            ],
            None => [
                entity.entity_id.to_string(),
                "UNKNOWN".to_string(),
                "UNKNOWN".to_string(),
                String::new(),
                String::new(),
                String::new(),
            ],
        };
        out.write_record(&row)?;
        rows += 1;
    }
    Ok(rows)
}

pub fn write_relations<W: Write>(
    out: &mut CsvWriter<W>,
    assertions: &[Assertion],
    delimiter: &str,
) -> io::Result<usize> {
    out.write_record(RELATION_HEADER)?;
    for assertion in assertions {
        out.write_record(&[
            assertion.assertion_id.clone(),
            assertion.subject_id.to_string(),
            assertion.object_id.to_string(),
            assertion.predicate.clone(),
            assertion.confidence.to_string(),
            assertion.sources_joined(delimiter),
            opt(assertion.context_time_id),
            opt(assertion.context_location_id),
        ])?;
    }
    Ok(assertions.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityMention, SpatialAttributes, TemporalAttributes, Precision, TimeType};
    use chrono::NaiveDate;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn render(f: impl FnOnce(&mut CsvWriter<Vec<u8>>) -> io::Result<usize>) -> String {
        let mut out = CsvWriter::new(Vec::new());
        f(&mut out).unwrap();
        String::from_utf8(out.into_inner()).unwrap()
    }

    fn entity(id: &str, entity_type: EntityType, text: &str) -> CanonicalEntity {
        CanonicalEntity::from_mention(&EntityMention::new(id, "art1", entity_type, text, 0.5))
            .freeze()
    }

    #[test]
    fn test_quoting() {
        let text = render(|out| {
            out.write_record(&["plain", "a,b", "say \"hi\"", "two\nlines"])?;
            Ok(1)
        });
        assert_eq!(text, "plain,\"a,b\",\"say \"\"hi\"\"\",\"two\nlines\"\n");
    }

    #[test]
    fn test_entities_stream() {
        let mut e = entity("art1#E1", EntityType::Organization, "Bank, Austria");
        e.sources = BTreeSet::from(["art1".to_string(), "art2".to_string()]);
        let text = render(|out| write_entities(out, &[e.clone()], "|"));

        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("entity_id,type,text,normalized,confidence,sources"));
        assert_eq!(
            lines.next().unwrap(),
            format!("{},ORGANIZATION,\"Bank, Austria\",bank austria,0.5,art1|art2", e.entity_id)
        );
    }

    #[test]
    fn test_locations_include_ungeocoded() {
        let mut vienna = entity("art1#E1", EntityType::Location, "Vienna");
        vienna.attach_spatial(SpatialAttributes {
            latitude: Some(48.2),
            longitude: Some(16.37),
            display_name: Some("Wien".into()),
            ..SpatialAttributes::default()
        });
        let atlantis = entity("art1#E2", EntityType::Location, "Atlantis");
        let person = entity("art1#E3", EntityType::Person, "Joffre");

        let text = render(|out| write_locations(out, &[vienna.clone(), atlantis.clone(), person]));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], format!("{},48.2,16.37,Wien,,,,,,", vienna.entity_id));
        assert_eq!(lines[2], format!("{},,,,,,,,,", atlantis.entity_id));
    }

    #[test]
    fn test_timeperiods_stream() {
        let mut month = entity("art1#E1", EntityType::Time, "1916-02");
        month.attach_temporal(TemporalAttributes::span(
            Precision::Month,
            TimeType::Period,
            NaiveDate::from_ymd_opt(1916, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(1916, 2, 29).unwrap(),
            0.85,
        ));
        let vague = entity("art1#E2", EntityType::Time, "damals");

        let text = render(|out| write_timeperiods(out, &[month.clone(), vague.clone()]));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[1],
            format!("{},MONTH,PERIOD,1916-02-01,1916-02-29,0.85", month.entity_id)
        );
        assert_eq!(lines[2], format!("{},UNKNOWN,UNKNOWN,,,", vague.entity_id));
    }

    #[test]
    fn test_relations_stream() {
        let assertion = Assertion {
            assertion_id: "art1#R0".into(),
            predicate: "met".into(),
            confidence: 0.75,
            sources: BTreeSet::from(["art1".to_string()]),
            subject_id: Uuid::from_u128(1),
            object_id: Uuid::from_u128(2),
            context_time_id: None,
            context_location_id: Some(Uuid::from_u128(3)),
        };

        let text = render(|out| write_relations(out, &[assertion], "|"));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], RELATION_HEADER.join(","));
        assert_eq!(
            lines[1],
            format!(
                "art1#R0,{},{},met,0.75,art1,,{}",
                Uuid::from_u128(1),
                Uuid::from_u128(2),
                Uuid::from_u128(3)
            )
        );
    }
}
