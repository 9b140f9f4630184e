use std::sync::Arc;

use haltree_base::HaltreeResult;

use super::value::{Record, RenderedValue};
use crate::resolve::{ResolvedNode, join_path};
use crate::schema::RelationshipTag;

/// A relation-named reference to another path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub rel: String,
    pub href: String,
}

impl Link {
    pub fn new(rel: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            href: href.into(),
        }
    }
}

/// Render-time snapshot of one resolved node.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub rel: String,
    /// Entity fields, without those re-expressed as links or embeds. `None` for collections.
    pub entity: Option<Record>,
    pub embedded_members: Vec<Resource>,
    pub embedded_items: Vec<Resource>,
    pub links: Vec<Link>,
}

impl ResolvedNode {
    /// `self` followed by a link for every member tagged `link()`.
    pub fn links(&self) -> Vec<Link> {
        let href = self.href();
        let mut links = vec![Link::new("self", href.clone())];
        if !self.node().is_collection() {
            for member in self.node().members() {
                if member.tag().link {
                    links.push(Link::new(
                        member.tag().rel.clone(),
                        join_path(&href, member.url_name()),
                    ));
                }
            }
        }
        links
    }

    /// The full resource for this node.
    pub fn resource(self: &Arc<Self>) -> HaltreeResult<Resource> {
        let links = self.links();
        let embedded_members = self.embedded_members()?;
        let embedded_items = self.embedded_items()?;
        let entity = if self.node().is_collection() {
            None
        } else {
            match RenderedValue::from(self.entity_json()?) {
                RenderedValue::Record(mut record) => {
                    for member in self.node().members() {
                        if member.tag().embed || member.tag().link {
                            record.remove_ignore_case(member.name());
                            record.remove_ignore_case(&member.tag().rel);
                        }
                    }
                    for link in &links {
                        record.remove_ignore_case(&link.rel);
                    }
                    Some(record)
                }
                _ => None,
            }
        };
        Ok(Resource {
            rel: self.tag().rel.clone(),
            entity,
            embedded_members,
            embedded_items,
            links,
        })
    }

    /// The resource as it appears embedded under a relationship tagged with `tag`.
    ///
    /// An `embed(a,b)` field list keeps exactly those fields in that order; a listed
    /// field the entity lacks is rendered as `null`.
    pub fn embedded_resource(self: &Arc<Self>, tag: &RelationshipTag) -> HaltreeResult<Resource> {
        let mut resource = self.resource()?;
        resource.rel = tag.rel.clone();
        if !tag.embed_fields.is_empty() {
            if let Some(entity) = resource.entity.take() {
                resource.entity = Some(
                    tag.embed_fields
                        .iter()
                        .map(|field| {
                            let value =
                                entity.get(field).cloned().unwrap_or(RenderedValue::Absent);
                            (field.clone(), value)
                        })
                        .collect(),
                );
            }
        }
        Ok(resource)
    }

    /// Resources of the members tagged `embed()`. Zero singular members are left out.
    pub fn embedded_members(self: &Arc<Self>) -> HaltreeResult<Vec<Resource>> {
        if self.node().is_collection() {
            return Ok(vec![]);
        }
        let mut embedded = vec![];
        for member in self.node().members() {
            if !member.tag().embed {
                continue;
            }
            let child = self.resolve(member.url_name(), None, true)?;
            if !child.node().is_collection() && child.is_zero() {
                continue;
            }
            embedded.push(Arc::new(child).embedded_resource(member.tag())?);
        }
        Ok(embedded)
    }

    /// Resources of every collection item, in id order, rendered with the collection's tag.
    pub fn embedded_items(self: &Arc<Self>) -> HaltreeResult<Vec<Resource>> {
        let mut items = vec![];
        for id in self.ids() {
            let item = self.resolve(id, None, false)?;
            items.push(Arc::new(item).embedded_resource(self.tag())?);
        }
        Ok(items)
    }
}
