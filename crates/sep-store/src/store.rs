//! Resource store
//!
//! One store per resource family. Items live in insertion order and their
//! index is never reused. Each item may own named child lists; every list
//! holds exactly one concrete resource kind.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use sep_core::href;
use sep_core::{AnyResource, ListEnvelope, Resource, StoreError, StoreResult};

use crate::index::HrefIndex;
use crate::page::{offset_index, paginate, Page};

/// Store shared between the request layer and the scheduler.
/// One lock per resource family serializes all mutations of that family.
pub type SharedStore<T> = Arc<RwLock<ResourceStore<T>>>;

type ChildKey = (usize, String);

/// Indexed collection of one resource kind plus its child lists
#[derive(Debug)]
pub struct ResourceStore<T: Resource> {
    href_prefix: String,
    items: Vec<T>,
    children: HashMap<ChildKey, Vec<AnyResource>>,
    index: Option<Arc<HrefIndex>>,
}

impl<T: Resource> ResourceStore<T> {
    /// Create a store whose default hrefs are `prefix_<index>`
    pub fn new(href_prefix: impl Into<String>) -> Self {
        Self {
            href_prefix: href_prefix.into(),
            items: Vec::new(),
            children: HashMap::new(),
            index: None,
        }
    }

    /// Create a store that snapshots every added resource into `index`
    pub fn with_index(href_prefix: impl Into<String>, index: Arc<HrefIndex>) -> Self {
        Self {
            index: Some(index),
            ..Self::new(href_prefix)
        }
    }

    /// Wrap into a [`SharedStore`]
    pub fn shared(self) -> SharedStore<T> {
        Arc::new(RwLock::new(self))
    }

    pub fn href_prefix(&self) -> &str {
        &self.href_prefix
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    fn persist<S: serde::Serialize>(&self, href: Option<&str>, value: &S) -> StoreResult<()> {
        if let (Some(index), Some(href)) = (&self.index, href) {
            index.put(href, value)?;
        }
        Ok(())
    }

    // ========================================================================
    // Items
    // ========================================================================

    /// Append `item`, assigning `prefix_<index>` when it has no href.
    /// An href that is already set is kept as is.
    pub fn add(&mut self, mut item: T) -> StoreResult<usize> {
        let index = self.items.len();
        if item.href().is_none() {
            item.set_href(href::indexed(&self.href_prefix, index));
        }
        self.persist(item.href(), &item)?;
        debug!(kind = %T::KIND, index, href = ?item.href(), "Resource added");
        self.items.push(item);
        Ok(index)
    }

    /// Add a resource of unknown kind, failing unless it is a `T`
    pub fn add_any(&mut self, item: AnyResource) -> StoreResult<usize> {
        match T::from_any(item) {
            Ok(item) => self.add(item),
            Err(other) => Err(StoreError::TypeMismatch {
                expected: T::KIND,
                found: other.kind(),
            }),
        }
    }

    /// Replace the item at `index`, keeping the stored href
    pub fn replace(&mut self, index: usize, mut item: T) -> StoreResult<()> {
        let href = self.fetch(index)?.href().map(str::to_string);
        if let Some(href) = href {
            item.set_href(href);
        }
        self.persist(item.href(), &item)?;
        self.items[index] = item;
        Ok(())
    }

    pub fn fetch(&self, index: usize) -> StoreResult<&T> {
        self.items
            .get(index)
            .ok_or_else(|| StoreError::not_found(format!("{} index {}", T::KIND, index)))
    }

    /// Mutable access. Changes are not snapshotted until [`Self::persist_item`].
    pub fn fetch_mut(&mut self, index: usize) -> StoreResult<&mut T> {
        self.items
            .get_mut(index)
            .ok_or_else(|| StoreError::not_found(format!("{} index {}", T::KIND, index)))
    }

    /// Re-snapshot the item at `index`
    pub fn persist_item(&self, index: usize) -> StoreResult<()> {
        let item = self.fetch(index)?;
        self.persist(item.href(), item)
    }

    /// First item whose property equals `value` (linear scan)
    ///
    /// ```
    /// # use sep_store::ResourceStore;
    /// # use sep_core::EndDevice;
    /// let mut store = ResourceStore::new("/edev");
    /// store.add(EndDevice { sfdi: 42, ..EndDevice::default() }).unwrap();
    /// assert!(store.fetch_by_property(|d| Some(&d.sfdi), &42).is_some());
    /// ```
    pub fn fetch_by_property<V, F>(&self, prop: F, value: &V) -> Option<&T>
    where
        V: PartialEq + ?Sized,
        F: Fn(&T) -> Option<&V>,
    {
        self.items.iter().find(|item| prop(*item) == Some(value))
    }

    pub fn fetch_by_href(&self, href: &str) -> Option<&T> {
        self.fetch_by_property(|item| item.href(), href)
    }

    pub fn fetch_by_mrid(&self, mrid: &str) -> Option<&T> {
        self.fetch_by_property(|item| item.mrid(), mrid)
    }

    /// Index of `item`: matched by href when it has one, else by equality
    pub fn fetch_index(&self, item: &T) -> StoreResult<usize> {
        let found = match item.href() {
            Some(href) => self.items.iter().position(|i| i.href() == Some(href)),
            None => self.items.iter().position(|i| i == item),
        };
        found.ok_or_else(|| {
            StoreError::not_found(format!(
                "{} {}",
                T::KIND,
                item.href().unwrap_or("<no href>")
            ))
        })
    }

    /// Index of the first item whose property equals `value`
    pub fn fetch_index_by_property<V, F>(&self, prop: F, value: &V) -> StoreResult<usize>
    where
        V: PartialEq + ?Sized,
        F: Fn(&T) -> Option<&V>,
    {
        self.items
            .iter()
            .position(|item| prop(item) == Some(value))
            .ok_or_else(|| StoreError::not_found(format!("{} by property", T::KIND)))
    }

    /// Page over all items of the store
    pub fn fetch_page<L: ListEnvelope<T>>(&self, envelope: L, page: Page) -> L {
        paginate(&self.items, envelope, page)
    }

    /// Single item at `after + 1 + start` (see [`offset_index`])
    pub fn fetch_at_offset(&self, start: Option<usize>, after: Option<usize>) -> StoreResult<&T> {
        self.fetch(offset_index(start, after))
    }

    // ========================================================================
    // Children
    // ========================================================================

    fn check_parent(&self, parent: usize) -> StoreResult<()> {
        self.fetch(parent).map(|_| ())
    }

    fn key(parent: usize, name: &str) -> ChildKey {
        (parent, name.to_string())
    }

    fn parent_href(&self, parent: usize) -> String {
        self.items
            .get(parent)
            .and_then(|p| p.href())
            .map(str::to_string)
            .unwrap_or_else(|| href::indexed(&self.href_prefix, parent))
    }

    fn check_kind<C: Resource>(list: &[AnyResource], name: &str) -> StoreResult<()> {
        match list.first() {
            Some(first) if first.kind() != C::KIND => Err(StoreError::TypeConflict {
                name: name.to_string(),
                expected: first.kind(),
                found: C::KIND,
            }),
            _ => Ok(()),
        }
    }

    /// Add `child` under `(parent, name)`, or replace the child with the
    /// same href. Returns the child's href.
    ///
    /// A child without href gets `parent_name_<position>`; `href_override`
    /// takes precedence over both.
    pub fn add_replace_child<C: Resource>(
        &mut self,
        parent: usize,
        name: &str,
        mut child: C,
        href_override: Option<String>,
    ) -> StoreResult<String> {
        self.check_parent(parent)?;
        let key = Self::key(parent, name);
        let position = match self.children.get(&key) {
            Some(list) => {
                Self::check_kind::<C>(list, name)?;
                list.len()
            }
            None => 0,
        };

        if let Some(h) = href_override {
            child.set_href(h);
        } else if child.href().is_none() {
            child.set_href(href::child(&self.parent_href(parent), name, position));
        }
        let child_href = child.href().map(str::to_string).unwrap_or_default();
        self.persist(Some(child_href.as_str()), &child)?;

        let list = self.children.entry(key).or_default();
        match list.iter().position(|c| c.href() == Some(child_href.as_str())) {
            Some(pos) => {
                trace!(href = %child_href, "Child replaced");
                list[pos] = child.into_any();
            }
            None => {
                trace!(href = %child_href, "Child appended");
                list.push(child.into_any());
            }
        }
        Ok(child_href)
    }

    /// Remove the first child matching `child` (by href when set, else by
    /// equality) and return it
    pub fn remove_child<C: Resource>(
        &mut self,
        parent: usize,
        name: &str,
        child: &C,
    ) -> StoreResult<C> {
        self.check_parent(parent)?;
        let list = self
            .children
            .get_mut(&Self::key(parent, name))
            .ok_or_else(|| StoreError::not_found(format!("child list '{}'", name)))?;
        Self::check_kind::<C>(list, name)?;

        let pos = list
            .iter()
            .position(|c| match child.href() {
                Some(h) => c.href() == Some(h),
                None => C::from_any_ref(c) == Some(child),
            })
            .ok_or_else(|| {
                StoreError::not_found(format!(
                    "{} in '{}'",
                    child.href().unwrap_or("child"),
                    name
                ))
            })?;

        C::from_any(list.remove(pos)).map_err(|other| StoreError::TypeMismatch {
            expected: C::KIND,
            found: other.kind(),
        })
    }

    /// Remove every child carrying `mrid`. Returns how many were removed.
    pub fn remove_child_by_mrid(
        &mut self,
        parent: usize,
        name: &str,
        mrid: &str,
    ) -> StoreResult<usize> {
        self.check_parent(parent)?;
        let list = self
            .children
            .get_mut(&Self::key(parent, name))
            .ok_or_else(|| StoreError::not_found(format!("child list '{}'", name)))?;
        let before = list.len();
        list.retain(|c| c.mrid() != Some(mrid));
        let removed = before - list.len();
        if removed == 0 {
            return Err(StoreError::not_found(format!(
                "mRID {} in '{}'",
                mrid, name
            )));
        }
        Ok(removed)
    }

    /// Children under `(parent, name)`, empty when the list does not exist
    pub fn fetch_children<C: Resource>(
        &self,
        parent: usize,
        name: &str,
    ) -> StoreResult<Vec<C>> {
        self.check_parent(parent)?;
        let Some(list) = self.children.get(&Self::key(parent, name)) else {
            return Ok(Vec::new());
        };
        Self::check_kind::<C>(list, name)?;
        Ok(list.iter().filter_map(C::from_any_ref).cloned().collect())
    }

    /// Populate `envelope` with every child, `all` and `results` both equal
    /// to the list length
    pub fn fetch_children_into<C, L>(
        &self,
        parent: usize,
        name: &str,
        envelope: L,
    ) -> StoreResult<L>
    where
        C: Resource,
        L: ListEnvelope<C>,
    {
        let children = self.fetch_children::<C>(parent, name)?;
        Ok(paginate(&children, envelope, Page::all()))
    }

    /// Populate `envelope` with a page of children
    pub fn fetch_children_page<C, L>(
        &self,
        parent: usize,
        name: &str,
        envelope: L,
        page: Page,
    ) -> StoreResult<L>
    where
        C: Resource,
        L: ListEnvelope<C>,
    {
        let children = self.fetch_children::<C>(parent, name)?;
        Ok(paginate(&children, envelope, page))
    }

    /// Child at `position` under `(parent, name)`
    pub fn fetch_child<C: Resource>(
        &self,
        parent: usize,
        name: &str,
        position: usize,
    ) -> StoreResult<&C> {
        self.check_parent(parent)?;
        let list = self
            .children
            .get(&Self::key(parent, name))
            .ok_or_else(|| StoreError::not_found(format!("child list '{}'", name)))?;
        Self::check_kind::<C>(list, name)?;
        list.get(position)
            .and_then(C::from_any_ref)
            .ok_or_else(|| StoreError::not_found(format!("'{}' position {}", name, position)))
    }

    /// Position of the first child carrying `mrid`
    pub fn fetch_child_index_by_mrid(
        &self,
        parent: usize,
        name: &str,
        mrid: &str,
    ) -> StoreResult<usize> {
        self.check_parent(parent)?;
        self.children
            .get(&Self::key(parent, name))
            .and_then(|list| list.iter().position(|c| c.mrid() == Some(mrid)))
            .ok_or_else(|| StoreError::not_found(format!("mRID {} in '{}'", mrid, name)))
    }

    /// Mutable view of the children under `(parent, name)`. Changes are not
    /// snapshotted until [`Self::persist_children`].
    pub fn children_mut<C: Resource>(
        &mut self,
        parent: usize,
        name: &str,
    ) -> StoreResult<impl Iterator<Item = &mut C>> {
        self.check_parent(parent)?;
        let list = self
            .children
            .get_mut(&Self::key(parent, name))
            .ok_or_else(|| StoreError::not_found(format!("child list '{}'", name)))?;
        Self::check_kind::<C>(list, name)?;
        Ok(list.iter_mut().filter_map(C::from_any_mut))
    }

    /// Overwrite the child at `position`, keeping its href
    pub fn replace_child<C: Resource>(
        &mut self,
        parent: usize,
        name: &str,
        position: usize,
        mut child: C,
    ) -> StoreResult<()> {
        self.check_parent(parent)?;
        let key = Self::key(parent, name);
        let list = self
            .children
            .get(&key)
            .ok_or_else(|| StoreError::not_found(format!("child list '{}'", name)))?;
        Self::check_kind::<C>(list, name)?;
        let existing = list
            .get(position)
            .ok_or_else(|| StoreError::not_found(format!("'{}' position {}", name, position)))?;
        if let Some(h) = existing.href() {
            child.set_href(h.to_string());
        }
        self.persist(child.href(), &child)?;
        if let Some(slot) = self.children.get_mut(&key).and_then(|l| l.get_mut(position)) {
            *slot = child.into_any();
        }
        Ok(())
    }

    /// Re-snapshot every child under `(parent, name)`
    pub fn persist_children(&self, parent: usize, name: &str) -> StoreResult<()> {
        self.check_parent(parent)?;
        if let Some(list) = self.children.get(&Self::key(parent, name)) {
            for child in list {
                self.persist(child.href(), &child.untagged())?;
            }
        }
        Ok(())
    }

    /// Stable sort of `(parent, name)` by a key of the child
    pub fn sort_children_by_key<C, K, F>(
        &mut self,
        parent: usize,
        name: &str,
        f: F,
    ) -> StoreResult<()>
    where
        C: Resource,
        K: Ord,
        F: Fn(&C) -> K,
    {
        self.check_parent(parent)?;
        if let Some(list) = self.children.get_mut(&Self::key(parent, name)) {
            Self::check_kind::<C>(list, name)?;
            list.sort_by_key(|c| C::from_any_ref(c).map(&f));
        }
        Ok(())
    }

    /// Names of the child lists under `parent`, sorted
    pub fn child_names(&self, parent: usize) -> StoreResult<Vec<String>> {
        self.check_parent(parent)?;
        let mut names: Vec<String> = self
            .children
            .keys()
            .filter(|(p, _)| *p == parent)
            .map(|(_, n)| n.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Number of children under `(parent, name)`, 0 when absent
    pub fn size_children(&self, parent: usize, name: &str) -> StoreResult<usize> {
        self.check_parent(parent)?;
        Ok(self
            .children
            .get(&Self::key(parent, name))
            .map_or(0, Vec::len))
    }
}
