//! In-memory implementation of UserStore.
//!
//! All tables live in one `parking_lot::RwLock`, so every operation,
//! including the multi-statement ones, is atomic with respect to the others.
//! State is lost on restart. Used by tests and for local runs without a
//! database.
//!
//! The `seed_*` helpers insert rows directly, bypassing password hashing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, oneshot};

use super::{
    MenuDeletion, NewMenu, NewRole, NewUser, PathRule, Profile, RoleRef, UserPage, UserQuery, UserStore,
    UserSummary, UserUpdate,
};
use crate::clock::format_timestamp;
use crate::models::user::hash_password;
use crate::models::{MenuNode, Role};

#[derive(Debug, Clone)]
struct UserRow {
    id: i32,
    nickname: String,
    username: String,
    password: String,
    email: Option<String>,
    phone: Option<String>,
    valid_time: DateTime<Utc>,
    remark: String,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: i32,
    users: BTreeMap<i32, UserRow>,
    roles: BTreeMap<i32, Role>,
    menus: BTreeMap<i32, MenuNode>,
    /// (user_id, role_id)
    user_roles: BTreeSet<(i32, i32)>,
    /// (menu_id, role_id)
    menu_roles: BTreeSet<(i32, i32)>,
    /// (user_id, menu_id)
    collections: Vec<(i32, i32)>,
}

impl Tables {
    fn allocate_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn user_id(&self, username: &str) -> Option<i32> {
        self.users
            .values()
            .find(|u| u.username == username)
            .map(|u| u.id)
    }

    fn role_ids_of(&self, username: &str) -> BTreeSet<i32> {
        let Some(user_id) = self.user_id(username) else {
            return BTreeSet::new();
        };
        self.user_roles
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, r)| *r)
            .collect()
    }

    fn granted_menu_ids(&self, username: &str) -> BTreeSet<i32> {
        let roles = self.role_ids_of(username);
        self.menu_roles
            .iter()
            .filter(|(_, r)| roles.contains(r))
            .map(|(m, _)| *m)
            .collect()
    }

    fn children_of(&self, parent_id: i32) -> impl Iterator<Item = &MenuNode> {
        self.menus
            .values()
            .filter(move |m| m.parent_id == Some(parent_id) && parent_id != 0)
    }
}

/// Store backed by in-process maps.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
    rule_reads: AtomicUsize,
    /// Release signal for a rule read parked by `hold_next_rule_read`.
    held_rule_read: Mutex<Option<oneshot::Receiver<()>>>,
    rule_read_parked: Notify,
}

impl MemoryUserStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user valid for a year, with no usable password.
    pub fn seed_user(&self, username: &str, nickname: &str) -> i32 {
        let mut t = self.tables.write();
        let id = t.allocate_id();
        t.users.insert(
            id,
            UserRow {
                id,
                nickname: nickname.to_string(),
                username: username.to_string(),
                password: String::new(),
                email: None,
                phone: None,
                valid_time: Utc::now() + Duration::days(365),
                remark: String::new(),
            },
        );
        id
    }

    /// Insert a role.
    pub fn seed_role(&self, role_name: &str) -> i32 {
        let mut t = self.tables.write();
        let id = t.allocate_id();
        t.roles.insert(
            id,
            Role {
                id,
                role_name: role_name.to_string(),
                remark: String::new(),
            },
        );
        id
    }

    /// Insert a menu.
    pub fn seed_menu(&self, url: &str, menu_name: &str, parent_id: Option<i32>) -> i32 {
        let mut t = self.tables.write();
        let id = t.allocate_id();
        t.menus.insert(
            id,
            MenuNode {
                id,
                url: url.to_string(),
                menu_name: menu_name.to_string(),
                parent_id,
                remark: String::new(),
                url_pre: String::new(),
            },
        );
        id
    }

    /// Grant a menu to a role.
    pub fn seed_grant(&self, menu_id: i32, role_id: i32) {
        self.tables.write().menu_roles.insert((menu_id, role_id));
    }

    /// Assign a role to a user.
    pub fn seed_assign(&self, user_id: i32, role_id: i32) {
        self.tables.write().user_roles.insert((user_id, role_id));
    }

    /// Bookmark a menu for a user.
    pub fn seed_collection(&self, user_id: i32, menu_id: i32) {
        self.tables.write().collections.push((user_id, menu_id));
    }

    /// Make every subsequent read fail, as an unreachable database would.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// How many times the full rule set has been read.
    pub fn rule_reads(&self) -> usize {
        self.rule_reads.load(Ordering::SeqCst)
    }

    /// Park the next full rule read after it has taken its snapshot.
    ///
    /// The read completes, returning that snapshot, once the returned
    /// sender fires or is dropped.
    pub fn hold_next_rule_read(&self) -> oneshot::Sender<()> {
        let (release, held) = oneshot::channel();
        *self.held_rule_read.lock() = Some(held);
        release
    }

    /// Wait until a held rule read has taken its snapshot.
    pub async fn rule_read_parked(&self) {
        self.rule_read_parked.notified().await;
    }

    /// Number of bookmarked menus for a user.
    pub fn collection_count(&self, user_id: i32) -> usize {
        self.tables
            .read()
            .collections
            .iter()
            .filter(|(u, _)| *u == user_id)
            .count()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("user store unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn list_all_path_rules(&self) -> Result<Vec<PathRule>> {
        self.ensure_available()?;
        self.rule_reads.fetch_add(1, Ordering::SeqCst);

        let rules: Vec<PathRule> = {
            let t = self.tables.read();
            t.menu_roles
                .iter()
                .filter_map(|(menu_id, role_id)| {
                    let menu = t.menus.get(menu_id)?;
                    let role = t.roles.get(role_id)?;
                    Some(PathRule::new(&menu.url, &role.role_name))
                })
                .collect()
        };

        let held = self.held_rule_read.lock().take();
        if let Some(held) = held {
            self.rule_read_parked.notify_one();
            let _ = held.await;
        }
        Ok(rules)
    }

    async fn find_required_roles_for_pattern(&self, pattern: &str) -> Result<Vec<String>> {
        self.ensure_available()?;
        let t = self.tables.read();
        let names: BTreeSet<String> = t
            .menu_roles
            .iter()
            .filter(|(menu_id, _)| t.menus.get(menu_id).is_some_and(|m| m.url == pattern))
            .filter_map(|(_, role_id)| t.roles.get(role_id).map(|r| r.role_name.clone()))
            .collect();
        Ok(names.into_iter().collect())
    }

    async fn find_profile_by_username(&self, username: &str) -> Result<Option<Profile>> {
        self.ensure_available()?;
        let t = self.tables.read();
        Ok(t.users
            .values()
            .find(|u| u.username == username)
            .map(|u| Profile {
                id: u.id,
                nickname: u.nickname.clone(),
                remark: u.remark.clone(),
            }))
    }

    async fn find_granted_url_patterns(&self, username: &str) -> Result<Vec<String>> {
        self.ensure_available()?;
        let t = self.tables.read();
        let urls: BTreeSet<String> = t
            .granted_menu_ids(username)
            .iter()
            .filter_map(|id| t.menus.get(id).map(|m| m.url.clone()))
            .collect();
        Ok(urls.into_iter().collect())
    }

    async fn find_all_root_menus(&self) -> Result<Vec<MenuNode>> {
        self.ensure_available()?;
        let t = self.tables.read();
        Ok(t.menus.values().filter(|m| m.is_root()).cloned().collect())
    }

    async fn find_children_by_parent_id(&self, parent_id: i32) -> Result<Vec<MenuNode>> {
        self.ensure_available()?;
        let t = self.tables.read();
        Ok(t.children_of(parent_id).cloned().collect())
    }

    async fn find_granted_root_menus(&self, username: &str) -> Result<Vec<MenuNode>> {
        self.ensure_available()?;
        let t = self.tables.read();
        let granted = t.granted_menu_ids(username);
        Ok(t.menus
            .values()
            .filter(|m| m.is_root() && granted.contains(&m.id))
            .cloned()
            .collect())
    }

    async fn find_partial_grant_root_ids(&self, username: &str) -> Result<Vec<i32>> {
        self.ensure_available()?;
        let t = self.tables.read();
        let parents: BTreeSet<i32> = t
            .granted_menu_ids(username)
            .iter()
            .filter_map(|id| t.menus.get(id))
            .filter(|m| !m.is_root())
            .filter_map(|m| m.parent_id)
            .collect();
        Ok(parents.into_iter().collect())
    }

    async fn find_menu_by_id(&self, id: i32) -> Result<Option<MenuNode>> {
        self.ensure_available()?;
        Ok(self.tables.read().menus.get(&id).cloned())
    }

    async fn find_granted_children(
        &self,
        username: &str,
        parent_id: i32,
    ) -> Result<Vec<MenuNode>> {
        self.ensure_available()?;
        let t = self.tables.read();
        let granted = t.granted_menu_ids(username);
        Ok(t.children_of(parent_id)
            .filter(|m| granted.contains(&m.id))
            .cloned()
            .collect())
    }

    async fn find_password_by_username_after_valid_time(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        self.ensure_available()?;
        let t = self.tables.read();
        Ok(t.users
            .values()
            .find(|u| u.username == username && u.valid_time > now)
            .map(|u| u.password.clone()))
    }

    async fn find_role_names_by_username(&self, username: &str) -> Result<Vec<String>> {
        self.ensure_available()?;
        let t = self.tables.read();
        let mut names: Vec<String> = t
            .role_ids_of(username)
            .iter()
            .filter_map(|id| t.roles.get(id).map(|r| r.role_name.clone()))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        self.ensure_available()?;
        Ok(self.tables.read().user_id(username).is_some())
    }

    async fn username_taken_by_other(&self, user_id: i32, username: &str) -> Result<bool> {
        self.ensure_available()?;
        Ok(self
            .tables
            .read()
            .users
            .values()
            .any(|u| u.username == username && u.id != user_id))
    }

    async fn add_user(&self, input: NewUser) -> Result<i32> {
        self.ensure_available()?;
        let password = hash_password(&input.password)?;

        let mut t = self.tables.write();
        if t.user_id(&input.username).is_some() {
            bail!("username {} already exists", input.username);
        }
        let id = t.allocate_id();
        t.users.insert(
            id,
            UserRow {
                id,
                nickname: input.nickname,
                username: input.username,
                password,
                email: input.email,
                phone: input.phone,
                valid_time: input.valid_time,
                remark: input.remark,
            },
        );
        Ok(id)
    }

    async fn update_user(&self, user_id: i32, input: UserUpdate) -> Result<bool> {
        self.ensure_available()?;
        let password = input.password.as_deref().map(hash_password).transpose()?;

        let mut t = self.tables.write();
        let Some(row) = t.users.get_mut(&user_id) else {
            return Ok(false);
        };
        row.nickname = input.nickname;
        row.username = input.username;
        row.email = input.email;
        row.phone = input.phone;
        row.remark = input.remark;
        if let Some(password) = password {
            row.password = password;
        }
        if let Some(valid_time) = input.valid_time {
            row.valid_time = valid_time;
        }
        Ok(true)
    }

    async fn delete_users(&self, user_ids: &[i32]) -> Result<u64> {
        self.ensure_available()?;
        let mut t = self.tables.write();
        let mut deleted = 0;
        for id in user_ids {
            t.user_roles.retain(|(u, _)| u != id);
            if t.users.remove(id).is_some() {
                deleted += 1;
            }
            t.collections.retain(|(u, _)| u != id);
        }
        Ok(deleted)
    }

    async fn set_user_roles(&self, user_id: i32, role_ids: &[i32]) -> Result<()> {
        self.ensure_available()?;
        let mut t = self.tables.write();
        t.user_roles.retain(|(u, _)| *u != user_id);
        t.user_roles
            .extend(role_ids.iter().map(|role_id| (user_id, *role_id)));
        Ok(())
    }

    async fn find_users(&self, query: &UserQuery) -> Result<UserPage> {
        self.ensure_available()?;
        let t = self.tables.read();

        let matching: Vec<&UserRow> = t
            .users
            .values()
            .filter(|u| u.username.contains(&query.username) && u.nickname.contains(&query.nickname))
            .collect();
        let total = i64::try_from(matching.len())?;
        let skip = usize::try_from(query.offset())?;

        let users = matching
            .into_iter()
            .skip(skip)
            .take(query.page_size as usize)
            .map(|u| UserSummary {
                id: u.id,
                nickname: u.nickname.clone(),
                username: u.username.clone(),
                email: u.email.clone(),
                phone: u.phone.clone(),
                valid_time: format_timestamp(&u.valid_time),
                remark: u.remark.clone(),
                role_list: t
                    .user_roles
                    .iter()
                    .filter(|(uid, _)| *uid == u.id)
                    .filter_map(|(_, rid)| t.roles.get(rid))
                    .map(|r| RoleRef {
                        id: r.id,
                        role_name: r.role_name.clone(),
                    })
                    .collect(),
            })
            .collect();

        Ok(UserPage { users, total })
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        self.ensure_available()?;
        Ok(self.tables.read().roles.values().cloned().collect())
    }

    async fn create_role(&self, input: NewRole) -> Result<i32> {
        self.ensure_available()?;
        let mut t = self.tables.write();
        if t.roles.values().any(|r| r.role_name == input.role_name) {
            bail!("role {} already exists", input.role_name);
        }
        let id = t.allocate_id();
        t.roles.insert(
            id,
            Role {
                id,
                role_name: input.role_name,
                remark: input.remark,
            },
        );
        Ok(id)
    }

    async fn delete_role(&self, role_id: i32) -> Result<bool> {
        self.ensure_available()?;
        let mut t = self.tables.write();
        t.menu_roles.retain(|(_, r)| *r != role_id);
        t.user_roles.retain(|(_, r)| *r != role_id);
        Ok(t.roles.remove(&role_id).is_some())
    }

    async fn set_role_menus(&self, role_id: i32, menu_ids: &[i32]) -> Result<()> {
        self.ensure_available()?;
        let mut t = self.tables.write();
        t.menu_roles.retain(|(_, r)| *r != role_id);
        t.menu_roles
            .extend(menu_ids.iter().map(|menu_id| (*menu_id, role_id)));
        Ok(())
    }

    async fn list_menus(&self) -> Result<Vec<MenuNode>> {
        self.ensure_available()?;
        Ok(self.tables.read().menus.values().cloned().collect())
    }

    async fn create_menu(&self, input: NewMenu) -> Result<i32> {
        self.ensure_available()?;
        let mut t = self.tables.write();
        let id = t.allocate_id();
        t.menus.insert(
            id,
            MenuNode {
                id,
                url: input.url,
                menu_name: input.menu_name,
                parent_id: input.parent_id,
                remark: input.remark,
                url_pre: input.url_pre,
            },
        );
        Ok(id)
    }

    async fn delete_menu(&self, menu_id: i32) -> Result<MenuDeletion> {
        self.ensure_available()?;
        let mut t = self.tables.write();
        if !t.menus.contains_key(&menu_id) {
            return Ok(MenuDeletion::Missing);
        }
        if t.children_of(menu_id).next().is_some() {
            return Ok(MenuDeletion::HasChildren);
        }

        t.menu_roles.retain(|(m, _)| *m != menu_id);
        t.menus.remove(&menu_id);
        Ok(MenuDeletion::Deleted)
    }

    async fn is_healthy(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }
}
