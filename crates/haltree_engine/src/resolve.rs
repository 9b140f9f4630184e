use std::fmt;
use std::sync::Arc;

use haltree_base::{HaltreeError, HaltreeResult};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::ops::{InputRole, Inputs, OperationName, RoleValue};
use crate::schema::{EntityRef, Node, RelationshipTag, Schema};

/* 📖 # How does a path become live data?

Resolution starts at the root, whose Manifest runs with no parent and an empty id. Each
path segment then moves one step down the compiled tree:

- From a singular node, the segment names a member (case-insensitively). The child is
  manifested with the current entity as its parent.
- From a collection node, the segment is an item id. The element node is manifested
  with the collection value as its parent, and a zero result means there is no such
  item.

Collections are manifested by Page, which also yields the ordered item ids. The chain of
ResolvedNodes lives only for one request; nothing is cached between requests.
*/

/// Characters escaped when an id is written back into an href.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// The live value behind a resolved node.
#[derive(Clone)]
pub enum Manifested {
    Singular(EntityRef),
    Collection {
        collection: EntityRef,
        ids: Vec<String>,
    },
}

impl Manifested {
    pub fn entity(&self) -> &EntityRef {
        match self {
            Manifested::Singular(entity) => entity,
            Manifested::Collection { collection, .. } => collection,
        }
    }
}

impl fmt::Debug for Manifested {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Manifested::Singular(_) => write!(f, "Singular(..)"),
            Manifested::Collection { ids, .. } => write!(f, "Collection({:?})", ids),
        }
    }
}

impl Node {
    /// Run Manifest (singular) or Page (collection) for this node.
    pub fn manifest(
        &self,
        parent: Option<EntityRef>,
        id: &str,
        page: i64,
    ) -> HaltreeResult<Manifested> {
        let inputs = Inputs::new()
            .with(InputRole::Parent, || {
                Ok(parent
                    .clone()
                    .map(RoleValue::Entity)
                    .unwrap_or(RoleValue::Absent))
            })
            .with(InputRole::Id, || Ok(RoleValue::Str(id.to_string())))
            .with(InputRole::PageNumber, || Ok(RoleValue::Int(page)));
        if self.is_collection() {
            let invocation = self.invoke(OperationName::Page, &inputs)?;
            Ok(Manifested::Collection {
                collection: EntityRef::from(invocation.entity),
                ids: invocation.other.unwrap_or_default(),
            })
        } else {
            let invocation = self.invoke(OperationName::Manifest, &inputs)?;
            Ok(Manifested::Singular(EntityRef::from(invocation.entity)))
        }
    }
}

/// Options for [`ResolvedNode::locate_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocateOptions {
    /// Page number handed to the terminal collection; intermediate ones use their tag.
    pub page: Option<i64>,
    /// Accept a zero collection item at the end of the path (PUT creating a new item).
    pub allow_absent_target: bool,
}

/// A request-scoped, manifested position in the tree.
#[derive(Clone)]
pub struct ResolvedNode {
    id: String,
    parent: Option<Arc<ResolvedNode>>,
    node: Arc<Node>,
    tag: Arc<RelationshipTag>,
    state: Manifested,
}

impl ResolvedNode {
    /// Manifest the root entity.
    pub fn root(schema: &Schema) -> HaltreeResult<Self> {
        let node = Arc::clone(schema.root());
        let state = node.manifest(None, "", 0)?;
        Ok(Self {
            id: String::new(),
            parent: None,
            tag: Arc::clone(node.tag()),
            node,
            state,
        })
    }

    pub fn locate(self, segments: &[&str]) -> HaltreeResult<ResolvedNode> {
        self.locate_with(segments, &LocateOptions::default())
    }

    /// Walk `segments` down from this node.
    ///
    /// A single trailing empty segment (a path ending in `/`) addresses the node itself.
    /// Any other empty segment is looked up like an id and fails to resolve.
    pub fn locate_with(
        self,
        segments: &[&str],
        options: &LocateOptions,
    ) -> HaltreeResult<ResolvedNode> {
        let segments = match segments.split_last() {
            Some((last, rest)) if last.is_empty() => rest,
            _ => segments,
        };
        let mut current = self;
        for (index, id) in segments.iter().enumerate() {
            let terminal = index + 1 == segments.len();
            let page = if terminal { options.page } else { None };
            current = Arc::new(current).resolve(id, page, terminal && options.allow_absent_target)?;
        }
        Ok(current)
    }

    /// Resolve one path segment below this node.
    pub fn resolve(
        self: &Arc<Self>,
        id: &str,
        page: Option<i64>,
        allow_absent: bool,
    ) -> HaltreeResult<ResolvedNode> {
        match &self.state {
            Manifested::Singular(_) => {
                let member = self.node.member(id).ok_or_else(|| {
                    HaltreeError::not_found(format!(
                        "{} ({}) does not have a member called '{}'",
                        self.node.type_name(),
                        self.path(),
                        id
                    ))
                })?;
                self.child(member.url_name(), member.node(), member.tag(), page)
            }
            Manifested::Collection { .. } => {
                let element = self.node.element().ok_or_else(|| {
                    HaltreeError::message(format!(
                        "collection {} has no element type",
                        self.node.type_name()
                    ))
                })?;
                let child = self.child(id, element.node(), element.tag(), page)?;
                if !allow_absent && child.is_zero() {
                    return Err(Box::new(HaltreeError::not_found(format!(
                        "collection '{}' does not have an item with ID '{}'",
                        self.id, id
                    ))));
                }
                Ok(child)
            }
        }
    }

    fn child(
        self: &Arc<Self>,
        id: &str,
        node: &Arc<Node>,
        tag: &Arc<RelationshipTag>,
        page: Option<i64>,
    ) -> HaltreeResult<ResolvedNode> {
        let state = node.manifest(
            Some(Arc::clone(self.entity())),
            id,
            page.unwrap_or(tag.page_number),
        )?;
        Ok(ResolvedNode {
            id: id.to_string(),
            parent: Some(Arc::clone(self)),
            node: Arc::clone(node),
            tag: Arc::clone(tag),
            state,
        })
    }

    /// Manifest this node and its ancestors again, e.g. to pick up the canonical value
    /// after a write.
    pub fn remanifest(&mut self, page: Option<i64>) -> HaltreeResult<()> {
        if let Some(parent) = &self.parent {
            let mut parent = ResolvedNode::clone(parent);
            parent.remanifest(None)?;
            self.parent = Some(Arc::new(parent));
        }
        let parent = self.parent.as_ref().map(|parent| Arc::clone(parent.entity()));
        let page = page.unwrap_or(self.tag.page_number);
        let state = self.node.manifest(parent, &self.id, page)?;
        self.set_entity(state);
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> Option<&Arc<ResolvedNode>> {
        self.parent.as_ref()
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn tag(&self) -> &Arc<RelationshipTag> {
        &self.tag
    }

    pub fn state(&self) -> &Manifested {
        &self.state
    }

    pub fn entity(&self) -> &EntityRef {
        self.state.entity()
    }

    pub fn set_entity(&mut self, state: Manifested) {
        self.state = state;
    }

    /// Ordered item ids; empty for singular nodes.
    pub fn ids(&self) -> &[String] {
        match &self.state {
            Manifested::Singular(_) => &[],
            Manifested::Collection { ids, .. } => ids,
        }
    }

    /// True if the manifested value equals the type's zero value.
    pub fn is_zero(&self) -> bool {
        self.node.entity().is_zero(self.entity().as_ref())
    }

    pub fn entity_json(&self) -> HaltreeResult<serde_json::Value> {
        self.node.entity().to_json(self.entity().as_ref())
    }

    /// Absolute path of this node, `/` for the root. Ids appear decoded.
    pub fn path(&self) -> String {
        match &self.parent {
            None => "/".to_string(),
            Some(parent) => join_path(&parent.path(), &self.id),
        }
    }

    /// The path as a URL, with every id percent-encoded.
    pub fn href(&self) -> String {
        match &self.parent {
            None => "/".to_string(),
            Some(parent) => join_path(
                &parent.href(),
                &utf8_percent_encode(&self.id, SEGMENT).to_string(),
            ),
        }
    }
}

impl fmt::Debug for ResolvedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedNode")
            .field("path", &self.path())
            .field("entity", &self.node.type_name())
            .field("state", &self.state)
            .finish()
    }
}

pub(crate) fn join_path(base: &str, segment: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, segment)
    } else {
        format!("{}/{}", base, segment)
    }
}
