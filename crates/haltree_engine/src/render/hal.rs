use super::filter::FieldSelector;
use super::resource::Resource;
use super::value::{Record, RenderedValue};

/* 📖 # How is a HAL document assembled?

The entity's own fields come first, filtered by the selector. `_links` follows and is
never filtered: every document carries at least its `self` link. `_embedded` holds
either the embedded members of a record (keyed by relation) or the items of a
collection (an array under the collection's relation).

An embedded member survives only if the selector names its relation (or selects
everything), and it is rendered with the selector narrowed to that relation. Collection
items sit at the same level as the collection itself and share its selector. This is
why `/pools/p1?fields=name` drops the embedded apps, while `?fields=name,apps.name`
keeps them with only their names.

A resource is never narrowed by its own relation, only by the relation of a member it
embeds. Items of `/pools` are therefore selected with `?fields=name`; asking for
`?fields=pools.name` matches no item field and yields items carrying only their links.
*/

/// Render `resource` as a HAL document.
pub fn render_hal(resource: &Resource, selector: &FieldSelector) -> RenderedValue {
    let mut document = match &resource.entity {
        Some(entity) => match selector.filter(RenderedValue::Record(entity.clone())) {
            RenderedValue::Record(record) => record,
            _ => Record::new(),
        },
        None => Record::new(),
    };

    let links = render_links(resource);
    if !links.is_empty() {
        document.insert("_links", RenderedValue::Record(links));
    }

    let mut embedded = Record::new();
    if resource.embedded_items.is_empty() {
        for member in &resource.embedded_members {
            if selector.is_empty() || selector.allows(&member.rel) {
                embedded.insert(
                    member.rel.clone(),
                    render_hal(member, &selector.enter(&member.rel)),
                );
            }
        }
    } else {
        let items = resource
            .embedded_items
            .iter()
            .map(|item| render_hal(item, selector))
            .collect();
        embedded.insert(resource.rel.clone(), RenderedValue::Sequence(items));
    }
    if !embedded.is_empty() {
        document.insert("_embedded", RenderedValue::Record(embedded));
    }

    RenderedValue::Record(document)
}

/// Group links by relation: a single `{href}` per relation, or an array when repeated.
fn render_links(resource: &Resource) -> Record {
    let mut links = Record::new();
    for link in &resource.links {
        let href: Record = [(
            "href".to_string(),
            RenderedValue::Scalar(link.href.clone().into()),
        )]
        .into_iter()
        .collect();
        let href = RenderedValue::Record(href);
        match links.get_mut(&link.rel) {
            Some(RenderedValue::Sequence(hrefs)) => hrefs.push(href),
            Some(existing) => {
                let first = std::mem::replace(existing, RenderedValue::Absent);
                *existing = RenderedValue::Sequence(vec![first, href]);
            }
            None => links.insert(link.rel.clone(), href),
        }
    }
    links
}
