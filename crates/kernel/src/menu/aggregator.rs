//! Per-user menu tree assembly.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::models::MenuNode;
use crate::store::UserStore;

/// Granted URL pattern that marks a principal as highest authority.
pub const HIGHEST_AUTHORITY_PATTERN: &str = "/**";

/// Errors building a menu tree.
#[derive(Debug, Error)]
pub enum MenuError {
    #[error("unknown principal: {0}")]
    UnknownPrincipal(String),

    /// A granted child references a parent that does not exist.
    #[error("menu {0} not found")]
    MissingMenu(i32),

    #[error(transparent)]
    Retrieval(#[from] anyhow::Error),
}

/// A root menu with its attached children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuTreeNode {
    #[serde(flatten)]
    pub node: MenuNode,
    pub children: Vec<MenuNode>,
}

/// Profile fields plus the menus a user may navigate to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMenuInfo {
    pub username: String,
    pub nickname: String,
    pub user_id: i32,
    pub remark: String,
    pub menu_list: Vec<MenuTreeNode>,
    /// Number of root entries in `menu_list`.
    pub total: usize,
}

/// Builds menu trees from the grants held in the user store.
#[derive(Clone)]
pub struct MenuAggregator {
    store: Arc<dyn UserStore>,
}

impl MenuAggregator {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Build the menu tree for `username`.
    ///
    /// A user granted `/**` sees every root with every child. Otherwise the
    /// list holds the granted roots with all their children, followed by the
    /// parents of granted child menus with only the granted children. A root
    /// may appear in both parts; entries are not merged.
    pub async fn build_menu_tree(&self, username: &str) -> Result<UserMenuInfo, MenuError> {
        let profile = self
            .store
            .find_profile_by_username(username)
            .await?
            .ok_or_else(|| MenuError::UnknownPrincipal(username.to_string()))?;

        let patterns = self.store.find_granted_url_patterns(username).await?;
        let highest_authority = patterns.iter().any(|p| p == HIGHEST_AUTHORITY_PATTERN);

        let menu_list = if highest_authority {
            let roots = self.store.find_all_root_menus().await?;
            self.attach_all_children(roots).await?
        } else {
            let roots = self.store.find_granted_root_menus(username).await?;
            let mut list = self.attach_all_children(roots).await?;

            for root_id in self.store.find_partial_grant_root_ids(username).await? {
                let node = self
                    .store
                    .find_menu_by_id(root_id)
                    .await?
                    .ok_or(MenuError::MissingMenu(root_id))?;
                let children = self.store.find_granted_children(username, root_id).await?;
                list.push(MenuTreeNode { node, children });
            }
            list
        };

        Ok(UserMenuInfo {
            username: username.to_string(),
            nickname: profile.nickname,
            user_id: profile.id,
            remark: profile.remark,
            total: menu_list.len(),
            menu_list,
        })
    }

    async fn attach_all_children(&self, roots: Vec<MenuNode>) -> anyhow::Result<Vec<MenuTreeNode>> {
        let mut list = Vec::with_capacity(roots.len());
        for node in roots {
            let children = self.store.find_children_by_parent_id(node.id).await?;
            list.push(MenuTreeNode { node, children });
        }
        Ok(list)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryUserStore;

    /// Three roots with two children each.
    struct Fixture {
        store: Arc<MemoryUserStore>,
        roots: [i32; 3],
        children: [[i32; 2]; 3],
    }

    fn fixture() -> Fixture {
        let store = MemoryUserStore::new();
        let mut roots = [0; 3];
        let mut children = [[0; 2]; 3];
        for (i, name) in ["system", "report", "audit"].iter().enumerate() {
            roots[i] = store.seed_menu(&format!("/{name}/**"), name, None);
            for (j, child) in ["list", "edit"].iter().enumerate() {
                children[i][j] =
                    store.seed_menu(&format!("/{name}/{child}"), child, Some(roots[i]));
            }
        }
        Fixture {
            store: Arc::new(store),
            roots,
            children,
        }
    }

    fn aggregator(store: &Arc<MemoryUserStore>) -> MenuAggregator {
        MenuAggregator::new(store.clone())
    }

    fn ids(nodes: &[MenuNode]) -> Vec<i32> {
        nodes.iter().map(|n| n.id).collect()
    }

    fn root_ids(info: &UserMenuInfo) -> Vec<i32> {
        info.menu_list.iter().map(|e| e.node.id).collect()
    }

    #[tokio::test]
    async fn highest_authority_sees_everything() {
        let f = fixture();
        let alice = f.store.seed_user("alice", "Alice");
        let role = f.store.seed_role("ROLE_SUPER");
        let everything = f.store.seed_menu("/**", "Everything", Some(f.roots[0]));
        f.store.seed_assign(alice, role);
        f.store.seed_grant(everything, role);

        let info = aggregator(&f.store).build_menu_tree("alice").await.unwrap();

        assert_eq!(info.user_id, alice);
        assert_eq!(info.nickname, "Alice");
        assert_eq!(root_ids(&info), f.roots.to_vec());
        assert_eq!(info.total, 3);
        assert_eq!(
            ids(&info.menu_list[1].children),
            f.children[1].to_vec(),
            "children are not filtered by grants"
        );
        assert_eq!(info.menu_list[0].children.len(), 3);
    }

    #[tokio::test]
    async fn partial_authority_combines_both_sources() {
        let f = fixture();
        let bob = f.store.seed_user("bob", "Bob");
        let role = f.store.seed_role("ROLE_OPS");
        f.store.seed_assign(bob, role);
        f.store.seed_grant(f.roots[0], role);
        f.store.seed_grant(f.roots[1], role);
        f.store.seed_grant(f.children[2][1], role);

        let info = aggregator(&f.store).build_menu_tree("bob").await.unwrap();

        assert_eq!(root_ids(&info), f.roots.to_vec());
        assert_eq!(info.total, 3);
        assert_eq!(ids(&info.menu_list[0].children), f.children[0].to_vec());
        assert_eq!(ids(&info.menu_list[1].children), f.children[1].to_vec());
        assert_eq!(ids(&info.menu_list[2].children), vec![f.children[2][1]]);
    }

    #[tokio::test]
    async fn overlapping_roots_are_kept_twice() {
        let f = fixture();
        let bob = f.store.seed_user("bob", "Bob");
        let role = f.store.seed_role("ROLE_OPS");
        f.store.seed_assign(bob, role);
        f.store.seed_grant(f.roots[0], role);
        f.store.seed_grant(f.children[0][0], role);

        let info = aggregator(&f.store).build_menu_tree("bob").await.unwrap();

        assert_eq!(root_ids(&info), vec![f.roots[0], f.roots[0]]);
        assert_eq!(info.total, 2);
        assert_eq!(ids(&info.menu_list[0].children), f.children[0].to_vec());
        assert_eq!(ids(&info.menu_list[1].children), vec![f.children[0][0]]);
    }

    #[tokio::test]
    async fn no_grants_yield_empty_list() {
        let f = fixture();
        f.store.seed_user("carol", "Carol");

        let info = aggregator(&f.store).build_menu_tree("carol").await.unwrap();
        assert!(info.menu_list.is_empty());
        assert_eq!(info.total, 0);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let f = fixture();
        let err = aggregator(&f.store)
            .build_menu_tree("nonexistent_user")
            .await
            .unwrap_err();
        assert!(matches!(err, MenuError::UnknownPrincipal(name) if name == "nonexistent_user"));
    }

    #[tokio::test]
    async fn dangling_parent_is_reported() {
        let f = fixture();
        let dave = f.store.seed_user("dave", "Dave");
        let role = f.store.seed_role("ROLE_ORPHAN");
        let orphan = f.store.seed_menu("/orphan", "Orphan", Some(9999));
        f.store.seed_assign(dave, role);
        f.store.seed_grant(orphan, role);

        let err = aggregator(&f.store).build_menu_tree("dave").await.unwrap_err();
        assert!(matches!(err, MenuError::MissingMenu(9999)));
    }

    #[tokio::test]
    async fn store_failure_is_a_retrieval_error() {
        let f = fixture();
        f.store.seed_user("bob", "Bob");
        f.store.set_unavailable(true);

        let err = aggregator(&f.store).build_menu_tree("bob").await.unwrap_err();
        assert!(matches!(err, MenuError::Retrieval(_)));
    }

    #[test]
    fn tree_node_serializes_flat_with_children() {
        let node = MenuNode {
            id: 1,
            url: "/system/**".to_string(),
            menu_name: "System".to_string(),
            parent_id: None,
            remark: String::new(),
            url_pre: "/system".to_string(),
        };
        let entry = MenuTreeNode {
            node,
            children: Vec::new(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["menuName"], "System");
        assert!(json["children"].as_array().unwrap().is_empty());
    }
}
