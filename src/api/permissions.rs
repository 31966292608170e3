use crate::model::{
    apperror::{ApplicationError, ErrorType},
    models::{ArtistDetailType, Role},
};

/**
 * Actions on the users resource.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    List,
    Retrieve,
    Create,
    Update,
    Delete,
    Me,
    AssignRole,
}

/**
 * Actions on the artists resource.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtistAction {
    List,
    Retrieve,
    Create,
    Update,
    Delete,
    Performance,
    Nationalities,
    Me,
}

/**
 * Actions on the countries resource.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountryAction {
    List,
    Retrieve,
    Create,
    Update,
    Delete,
}

/**
 * Actions on the charts resource.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartAction {
    List,
    Retrieve,
    Create,
    Delete,
    Countries,
    ByCountry,
}

/**
 * Actions on the chart entries resource. The filtered listings carry the
 * target id so ownership can be checked in one place.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartEntryAction {
    List,
    Retrieve,
    Create,
    Delete,
    UpdateEntry,
    ByManager { manager_id: i64 },
    ByArtist { user_id: i64 },
}

/**
 * Actions on the country clusters resource.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterAction {
    List,
    Retrieve,
    Create,
    Delete,
    Development,
}

/**
 * Turns a permission predicate result into a 403 error.
 */
pub fn ensure(allowed: bool) -> Result<(), ApplicationError> {
    if allowed { Ok(()) } else { Err(ApplicationError::new(ErrorType::Forbidden, "Forbidden".to_string())) }
}

/**
 * Action-level check for the users resource. Any role may retrieve,
 * update and read its own account; the rest is admin territory.
 */
pub fn user_has_permission(role: Role, action: UserAction) -> bool {
    if role == Role::Admin {
        return true;
    }
    matches!(action, UserAction::Retrieve | UserAction::Update | UserAction::Me)
}

/**
 * Object-level check for the users resource: non-admins only reach their
 * own account.
 */
pub fn user_has_object_permission(role: Role, login_user_id: i64, target_user_id: i64) -> bool {
    role == Role::Admin || login_user_id == target_user_id
}

/**
 * Action-level check for the artists resource.
 */
pub fn artist_has_permission(role: Role, action: ArtistAction) -> bool {
    if role == Role::Admin {
        return true;
    }
    matches!(action, ArtistAction::List | ArtistAction::Retrieve | ArtistAction::Update | ArtistAction::Performance | ArtistAction::Nationalities | ArtistAction::Me)
}

/**
 * Object-level check for the artists resource: artists reach their own
 * profile, managers the artists they manage; updates stay with the
 * artist itself.
 */
pub fn artist_has_object_permission(role: Role, login_user_id: i64, action: ArtistAction, artist: &ArtistDetailType) -> bool {
    if role == Role::Admin {
        return true;
    }
    let is_own_profile = artist.user_id == Some(login_user_id);
    let is_managed = role == Role::Manager && artist.manager_id == Some(login_user_id);
    match action {
        ArtistAction::Retrieve | ArtistAction::Performance => is_own_profile || is_managed,
        ArtistAction::Update => is_own_profile,
        _ => false,
    }
}

/**
 * Action-level check for the countries resource: reads for admin and
 * manager, writes admin only.
 */
pub fn country_has_permission(role: Role, action: CountryAction) -> bool {
    if role == Role::Admin {
        return true;
    }
    role == Role::Manager && matches!(action, CountryAction::List | CountryAction::Retrieve)
}

/**
 * Action-level check for the charts resource: reads for any role, writes
 * admin only.
 */
pub fn chart_has_permission(role: Role, action: ChartAction) -> bool {
    if role == Role::Admin {
        return true;
    }
    matches!(action, ChartAction::List | ChartAction::Retrieve | ChartAction::Countries | ChartAction::ByCountry)
}

/**
 * Check for the chart entries resource. The filtered listings are open to
 * the owning manager or artist login, the rank upsert to artist logins.
 */
pub fn chart_entry_has_permission(role: Role, login_user_id: i64, action: ChartEntryAction) -> bool {
    if role == Role::Admin {
        return true;
    }
    match action {
        ChartEntryAction::List | ChartEntryAction::Retrieve => true,
        ChartEntryAction::ByManager { manager_id } => role == Role::Manager && login_user_id == manager_id,
        ChartEntryAction::ByArtist { user_id } => role == Role::Artist && login_user_id == user_id,
        ChartEntryAction::UpdateEntry => role == Role::Artist,
        ChartEntryAction::Create | ChartEntryAction::Delete => false,
    }
}

/**
 * Action-level check for the country clusters resource: reads and the
 * development analysis for admin and manager, writes admin only.
 */
pub fn cluster_has_permission(role: Role, action: ClusterAction) -> bool {
    if role == Role::Admin {
        return true;
    }
    role == Role::Manager && matches!(action, ClusterAction::List | ClusterAction::Retrieve | ClusterAction::Development)
}

/**
 * Check for the export analysis: open to every authenticated role.
 */
pub fn export_analysis_has_permission(_role: Role) -> bool {
    true
}

#[cfg(test)]
mod test {
    use super::*;

    fn artist(user_id: Option<i64>, manager_id: Option<i64>) -> ArtistDetailType {
        ArtistDetailType::new(7, "Artist".to_string(), "FR".to_string(), user_id, manager_id, None)
    }

    #[test]
    fn test_admin_passes_everything() {
        assert!(user_has_permission(Role::Admin, UserAction::Delete));
        assert!(artist_has_permission(Role::Admin, ArtistAction::Create));
        assert!(country_has_permission(Role::Admin, CountryAction::Delete));
        assert!(chart_has_permission(Role::Admin, ChartAction::Create));
        assert!(chart_entry_has_permission(Role::Admin, 1, ChartEntryAction::Delete));
        assert!(chart_entry_has_permission(Role::Admin, 1, ChartEntryAction::ByManager { manager_id: 99 }));
        assert!(cluster_has_permission(Role::Admin, ClusterAction::Create));
        assert!(user_has_object_permission(Role::Admin, 1, 99));
        assert!(artist_has_object_permission(Role::Admin, 1, ArtistAction::Update, &artist(None, None)));
    }

    #[test]
    fn test_user_actions_for_non_admins() {
        for role in [Role::Manager, Role::Artist] {
            assert!(user_has_permission(role, UserAction::Retrieve));
            assert!(user_has_permission(role, UserAction::Update));
            assert!(user_has_permission(role, UserAction::Me));
            assert!(!user_has_permission(role, UserAction::List));
            assert!(!user_has_permission(role, UserAction::Create));
            assert!(!user_has_permission(role, UserAction::Delete));
            assert!(!user_has_permission(role, UserAction::AssignRole));
        }
    }

    #[test]
    fn test_user_object_permission_self_only() {
        assert!(user_has_object_permission(Role::Manager, 5, 5));
        assert!(!user_has_object_permission(Role::Manager, 5, 6));
        assert!(user_has_object_permission(Role::Artist, 5, 5));
        assert!(!user_has_object_permission(Role::Artist, 5, 6));
    }

    #[test]
    fn test_artist_actions_for_non_admins() {
        for role in [Role::Manager, Role::Artist] {
            assert!(artist_has_permission(role, ArtistAction::List));
            assert!(artist_has_permission(role, ArtistAction::Retrieve));
            assert!(artist_has_permission(role, ArtistAction::Performance));
            assert!(artist_has_permission(role, ArtistAction::Nationalities));
            assert!(artist_has_permission(role, ArtistAction::Me));
            assert!(!artist_has_permission(role, ArtistAction::Create));
            assert!(!artist_has_permission(role, ArtistAction::Delete));
        }
    }

    #[test]
    fn test_artist_object_permission() {
        let own = artist(Some(5), None);
        let managed = artist(None, Some(5));
        let foreign = artist(Some(6), Some(7));
        assert!(artist_has_object_permission(Role::Artist, 5, ArtistAction::Retrieve, &own));
        assert!(artist_has_object_permission(Role::Artist, 5, ArtistAction::Update, &own));
        assert!(artist_has_object_permission(Role::Artist, 5, ArtistAction::Performance, &own));
        assert!(!artist_has_object_permission(Role::Artist, 5, ArtistAction::Retrieve, &foreign));
        assert!(artist_has_object_permission(Role::Manager, 5, ArtistAction::Retrieve, &managed));
        assert!(artist_has_object_permission(Role::Manager, 5, ArtistAction::Performance, &managed));
        assert!(!artist_has_object_permission(Role::Manager, 5, ArtistAction::Update, &managed));
        assert!(!artist_has_object_permission(Role::Manager, 5, ArtistAction::Retrieve, &foreign));
    }

    #[test]
    fn test_country_actions() {
        assert!(country_has_permission(Role::Manager, CountryAction::List));
        assert!(country_has_permission(Role::Manager, CountryAction::Retrieve));
        assert!(!country_has_permission(Role::Manager, CountryAction::Create));
        assert!(!country_has_permission(Role::Manager, CountryAction::Update));
        assert!(!country_has_permission(Role::Manager, CountryAction::Delete));
        assert!(!country_has_permission(Role::Artist, CountryAction::List));
        assert!(!country_has_permission(Role::Artist, CountryAction::Retrieve));
    }

    #[test]
    fn test_chart_actions() {
        for role in [Role::Manager, Role::Artist] {
            assert!(chart_has_permission(role, ChartAction::List));
            assert!(chart_has_permission(role, ChartAction::Retrieve));
            assert!(chart_has_permission(role, ChartAction::Countries));
            assert!(chart_has_permission(role, ChartAction::ByCountry));
            assert!(!chart_has_permission(role, ChartAction::Create));
            assert!(!chart_has_permission(role, ChartAction::Delete));
        }
    }

    #[test]
    fn test_chart_entry_actions() {
        assert!(chart_entry_has_permission(Role::Artist, 5, ChartEntryAction::List));
        assert!(chart_entry_has_permission(Role::Manager, 5, ChartEntryAction::Retrieve));
        assert!(chart_entry_has_permission(Role::Manager, 5, ChartEntryAction::ByManager { manager_id: 5 }));
        assert!(!chart_entry_has_permission(Role::Manager, 5, ChartEntryAction::ByManager { manager_id: 6 }));
        assert!(!chart_entry_has_permission(Role::Artist, 5, ChartEntryAction::ByManager { manager_id: 5 }));
        assert!(chart_entry_has_permission(Role::Artist, 5, ChartEntryAction::ByArtist { user_id: 5 }));
        assert!(!chart_entry_has_permission(Role::Artist, 5, ChartEntryAction::ByArtist { user_id: 6 }));
        assert!(!chart_entry_has_permission(Role::Manager, 5, ChartEntryAction::ByArtist { user_id: 5 }));
        assert!(chart_entry_has_permission(Role::Artist, 5, ChartEntryAction::UpdateEntry));
        assert!(!chart_entry_has_permission(Role::Manager, 5, ChartEntryAction::UpdateEntry));
        assert!(!chart_entry_has_permission(Role::Manager, 5, ChartEntryAction::Create));
        assert!(!chart_entry_has_permission(Role::Artist, 5, ChartEntryAction::Delete));
    }

    #[test]
    fn test_cluster_actions() {
        assert!(cluster_has_permission(Role::Manager, ClusterAction::List));
        assert!(cluster_has_permission(Role::Manager, ClusterAction::Retrieve));
        assert!(cluster_has_permission(Role::Manager, ClusterAction::Development));
        assert!(!cluster_has_permission(Role::Manager, ClusterAction::Create));
        assert!(!cluster_has_permission(Role::Manager, ClusterAction::Delete));
        assert!(!cluster_has_permission(Role::Artist, ClusterAction::List));
        assert!(!cluster_has_permission(Role::Artist, ClusterAction::Development));
    }

    #[test]
    fn test_export_analysis_open_to_all_roles() {
        assert!(export_analysis_has_permission(Role::Admin));
        assert!(export_analysis_has_permission(Role::Manager));
        assert!(export_analysis_has_permission(Role::Artist));
    }

    #[test]
    fn test_ensure_maps_to_forbidden() {
        assert!(ensure(true).is_ok());
        let err = ensure(false).unwrap_err();
        assert_eq!(err.error_type, ErrorType::Forbidden);
    }
}
