use std::{cmp::Reverse, collections::HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::{Link, LinkId, Section, SectionId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionWithLinks {
    #[serde(flatten)]
    pub section: Section,
    pub links: Vec<Link>,
}

/// Read model of a user's dashboard: the pinned overlay plus every section in
/// rank order with its member links. Derived on every read, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardAggregate {
    pub pinned_links: Vec<Link>,
    pub sections: Vec<SectionWithLinks>,
}

impl DashboardAggregate {
    /// Builds the aggregate from flat store rows.
    ///
    /// Sections sort by `(order, id)`. Links without a section, or whose
    /// section is not among `sections`, land in the default section's bucket.
    /// Bucket members sort by `(created_at, id)`; pinned links sort newest
    /// first with id descending as the tie-break.
    pub fn project(mut sections: Vec<Section>, links: Vec<Link>) -> Self {
        sections.sort_by_key(|section| (section.order, section.id));

        let default_id = sections
            .iter()
            .find(|section| section.is_default)
            .map(|section| section.id);
        let mut buckets: HashMap<SectionId, Vec<Link>> = sections
            .iter()
            .map(|section| (section.id, Vec::new()))
            .collect();

        let mut pinned_links: Vec<Link> = links.iter().filter(|l| l.is_pinned).cloned().collect();
        pinned_links.sort_by_key(|link| (Reverse(link.created_at), Reverse(link.id)));

        for link in links {
            let home = link
                .section_id
                .filter(|id| buckets.contains_key(id))
                .or(default_id);
            if let Some(bucket) = home.and_then(|id| buckets.get_mut(&id)) {
                bucket.push(link);
            }
        }

        let sections = sections
            .into_iter()
            .map(|section| {
                let mut links = buckets.remove(&section.id).unwrap_or_default();
                links.sort_by_key(|link| (link.created_at, link.id));
                SectionWithLinks { section, links }
            })
            .collect();

        Self {
            pinned_links,
            sections,
        }
    }

    /// Flattens back into store-shaped rows, each link exactly once.
    pub fn into_parts(self) -> (Vec<Section>, Vec<Link>) {
        let mut sections = Vec::with_capacity(self.sections.len());
        let mut links = Vec::new();
        for entry in self.sections {
            sections.push(entry.section);
            links.extend(entry.links);
        }
        let bucketed: std::collections::HashSet<LinkId> = links.iter().map(|l| l.id).collect();
        links.extend(
            self.pinned_links
                .into_iter()
                .filter(|link| !bucketed.contains(&link.id)),
        );
        (sections, links)
    }

    pub fn section_ids(&self) -> Vec<SectionId> {
        self.sections.iter().map(|entry| entry.section.id).collect()
    }

    pub fn default_section(&self) -> Option<&Section> {
        self.sections
            .iter()
            .map(|entry| &entry.section)
            .find(|section| section.is_default)
    }

    pub fn section(&self, section_id: SectionId) -> Option<&SectionWithLinks> {
        self.sections
            .iter()
            .find(|entry| entry.section.id == section_id)
    }

    pub fn link(&self, link_id: LinkId) -> Option<&Link> {
        self.sections
            .iter()
            .flat_map(|entry| entry.links.iter())
            .chain(self.pinned_links.iter())
            .find(|link| link.id == link_id)
    }

    /// Id of the section whose bucket holds `link_id`.
    pub fn bucket_of(&self, link_id: LinkId) -> Option<SectionId> {
        self.sections
            .iter()
            .find(|entry| entry.links.iter().any(|link| link.id == link_id))
            .map(|entry| entry.section.id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::domain::UserId;

    fn section(id: i64, order: i64, is_default: bool) -> Section {
        Section {
            id: SectionId(id),
            name: format!("section-{id}"),
            order,
            user_id: UserId(1),
            is_default,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    fn link(id: i64, section_id: Option<i64>, pinned: bool, created_secs: i64) -> Link {
        Link {
            id: LinkId(id),
            title: format!("link-{id}"),
            url: format!("https://example.com/{id}"),
            description: None,
            is_pinned: pinned,
            user_id: UserId(1),
            section_id: section_id.map(SectionId),
            created_at: Utc.timestamp_opt(1_700_000_000 + created_secs, 0).unwrap(),
        }
    }

    fn sample() -> (Vec<Section>, Vec<Link>) {
        (
            vec![section(3, 1, false), section(1, 0, true), section(2, 1, false)],
            vec![
                link(10, Some(2), true, 5),
                link(11, None, false, 1),
                link(12, Some(3), true, 5),
                link(13, Some(2), false, 0),
                link(14, Some(99), false, 2),
            ],
        )
    }

    #[test]
    fn orders_sections_by_rank_then_id() {
        let (sections, links) = sample();
        let aggregate = DashboardAggregate::project(sections, links);
        assert_eq!(
            aggregate.section_ids(),
            vec![SectionId(1), SectionId(2), SectionId(3)]
        );
    }

    #[test]
    fn unsectioned_and_dangling_links_fall_into_default_bucket() {
        let (sections, links) = sample();
        let aggregate = DashboardAggregate::project(sections, links);
        let default = aggregate.section(SectionId(1)).expect("default");
        let ids: Vec<LinkId> = default.links.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![LinkId(11), LinkId(14)]);

        let second = aggregate.section(SectionId(2)).expect("second");
        let ids: Vec<LinkId> = second.links.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![LinkId(13), LinkId(10)]);
    }

    #[test]
    fn pinned_overlay_keeps_links_in_their_buckets() {
        let (sections, links) = sample();
        let aggregate = DashboardAggregate::project(sections, links);
        let pinned: Vec<LinkId> = aggregate.pinned_links.iter().map(|l| l.id).collect();
        assert_eq!(pinned, vec![LinkId(12), LinkId(10)]);
        assert_eq!(aggregate.bucket_of(LinkId(10)), Some(SectionId(2)));
        assert_eq!(aggregate.bucket_of(LinkId(12)), Some(SectionId(3)));
    }

    #[test]
    fn empty_sections_are_kept() {
        let aggregate = DashboardAggregate::project(vec![section(1, 0, true)], Vec::new());
        assert_eq!(aggregate.sections.len(), 1);
        assert!(aggregate.sections[0].links.is_empty());
    }

    #[test]
    fn projection_is_deterministic_regardless_of_input_order() {
        let (sections, links) = sample();
        let first = DashboardAggregate::project(sections.clone(), links.clone());

        let mut shuffled_sections = sections;
        shuffled_sections.reverse();
        let mut shuffled_links = links;
        shuffled_links.rotate_left(2);
        let second = DashboardAggregate::project(shuffled_sections, shuffled_links);

        assert_eq!(first, second);
    }

    #[test]
    fn into_parts_round_trips_through_projection() {
        let (sections, links) = sample();
        let aggregate = DashboardAggregate::project(sections, links);
        let (sections, links) = aggregate.clone().into_parts();
        assert_eq!(links.len(), 5);
        assert_eq!(DashboardAggregate::project(sections, links), aggregate);
    }
}
