#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;
    use veto_core::*;
    use veto_store::{InMemoryStore, SqliteStore};

    trait Backend: PrincipalStore + SettingsStore + LedgerStore {}
    impl<T: PrincipalStore + SettingsStore + LedgerStore> Backend for T {}

    fn backends() -> Vec<(&'static str, Box<dyn Backend>)> {
        vec![
            ("sqlite", Box::new(SqliteStore::open_in_memory().unwrap())),
            ("memory", Box::new(InMemoryStore::new())),
        ]
    }

    fn record(
        principal: PrincipalId,
        status: AuthorizationStatus,
        amount: f64,
        age: Duration,
    ) -> AuthorizationRecord {
        NewAuthorization {
            agent_id: Some("agent-7".into()),
            action_type: ActionType::Purchase,
            amount,
            category: Some("Books".into()),
            merchant: None,
            description: None,
            status,
            reason: WITHIN_LIMITS.into(),
            risk_score: None,
            authorization_token: None,
        }
        .into_record(principal, Utc::now() - age)
    }

    // ── Principals ─────────────────────────────────────────────

    mod principals {
        use super::*;

        #[test]
        fn test_ensure_principal_is_idempotent() {
            for (name, store) in backends() {
                let a = store.ensure_principal("alice").unwrap();
                let b = store.ensure_principal("alice").unwrap();
                assert_eq!(a.id, b.id, "{name}");
                assert_ne!(a.id, store.ensure_principal("bob").unwrap().id, "{name}");
            }
        }

        #[test]
        fn test_find_principal() {
            for (name, store) in backends() {
                assert!(store.find_principal("carol").unwrap().is_none(), "{name}");
                let created = store.ensure_principal("carol").unwrap();
                let found = store.find_principal("carol").unwrap().unwrap();
                assert_eq!(found.id, created.id, "{name}");
                assert_eq!(found.username, "carol", "{name}");
            }
        }
    }

    // ── Settings ───────────────────────────────────────────────

    mod settings {
        use super::*;

        #[test]
        fn test_insert_if_absent_keeps_first_row() {
            for (name, store) in backends() {
                let principal = store.ensure_principal("alice").unwrap();
                let first = PolicySettings::new(principal.id, &PolicyDefaults::default(), Utc::now());
                let stored = store.insert_settings_if_absent(&first).unwrap();
                assert_eq!(stored.id, first.id, "{name}");

                let mut second = PolicySettings::new(principal.id, &PolicyDefaults::default(), Utc::now());
                second.daily_limit = 999.0;
                let stored = store.insert_settings_if_absent(&second).unwrap();
                assert_eq!(stored.id, first.id, "{name}");
                assert_eq!(stored.daily_limit, 100.0, "{name}");
            }
        }

        #[test]
        fn test_settings_roundtrip_categories() {
            for (name, store) in backends() {
                let principal = store.ensure_principal("alice").unwrap();
                let mut settings = PolicySettings::new(principal.id, &PolicyDefaults::default(), Utc::now());
                settings.allowed_categories = Some(["Books".to_string(), "Travel".to_string()].into());
                settings.blocked_categories = Some(["Gambling".to_string()].into());
                store.insert_settings_if_absent(&settings).unwrap();

                let loaded = store.get_settings(principal.id).unwrap().unwrap();
                assert_eq!(loaded.allowed_categories, settings.allowed_categories, "{name}");
                assert_eq!(loaded.blocked_categories, settings.blocked_categories, "{name}");
                assert_eq!(loaded.created_at, settings.created_at, "{name}");
            }
        }

        #[test]
        fn test_update_missing_row_returns_none() {
            for (name, store) in backends() {
                let update = PolicySettingsUpdate {
                    daily_limit: Some(10.0),
                    ..Default::default()
                };
                assert!(store.update_settings(Uuid::new_v4(), &update, Utc::now()).unwrap().is_none(), "{name}");
            }
        }

        #[test]
        fn test_empty_update_only_bumps_updated_at() {
            for (name, store) in backends() {
                let principal = store.ensure_principal("alice").unwrap();
                let original = store
                    .insert_settings_if_absent(&PolicySettings::new(principal.id, &PolicyDefaults::default(), Utc::now()))
                    .unwrap();
                let later = original.updated_at + Duration::minutes(1);
                let updated = store
                    .update_settings(principal.id, &PolicySettingsUpdate::default(), later)
                    .unwrap()
                    .unwrap();
                assert_eq!(updated.updated_at, later, "{name}");
                let mut expected = original.clone();
                expected.updated_at = later;
                assert_eq!(updated, expected, "{name}");
                assert_eq!(store.get_settings(principal.id).unwrap().unwrap(), expected, "{name}");
            }
        }
    }

    // ── Ledger ─────────────────────────────────────────────────

    mod ledger {
        use super::*;

        #[test]
        fn test_spend_entries_filter() {
            for (name, store) in backends() {
                let p = store.ensure_principal("alice").unwrap().id;
                let other = store.ensure_principal("bob").unwrap().id;

                let approved = record(p, AuthorizationStatus::Approved, 30.0, Duration::hours(1));
                let denied = record(p, AuthorizationStatus::Denied, 500.0, Duration::hours(1));
                let stale = record(p, AuthorizationStatus::Approved, 40.0, Duration::hours(30));
                let foreign = record(other, AuthorizationStatus::Approved, 50.0, Duration::hours(1));
                let pending = record(p, AuthorizationStatus::Approved, 5.0, Duration::hours(2));
                for r in [&approved, &denied, &stale, &foreign, &pending] {
                    store.append(r).unwrap();
                }
                for r in [&approved, &denied, &stale, &foreign] {
                    let _ = store.mark_executed(r.principal_id, r.id);
                }

                let now = Utc::now();
                let executed = store
                    .spend_entries(&SpendQuery::executed(p, now - Duration::hours(24), now))
                    .unwrap();
                assert_eq!(executed.len(), 1, "{name}");
                assert_eq!(executed[0].amount, 30.0, "{name}");

                let pending_rows = store
                    .spend_entries(&SpendQuery::pending(p, now - Duration::hours(24), now))
                    .unwrap();
                assert_eq!(pending_rows.len(), 1, "{name}");
                assert_eq!(pending_rows[0].amount, 5.0, "{name}");
            }
        }

        #[test]
        fn test_recent_newest_first_with_limit_and_filter() {
            for (name, store) in backends() {
                let p = store.ensure_principal("alice").unwrap().id;
                let oldest = record(p, AuthorizationStatus::Approved, 1.0, Duration::hours(3));
                let middle = record(p, AuthorizationStatus::Denied, 2.0, Duration::hours(2));
                let newest = record(p, AuthorizationStatus::Approved, 3.0, Duration::hours(1));
                for r in [&middle, &newest, &oldest] {
                    store.append(r).unwrap();
                }

                let all = store.recent(p, 10, None).unwrap();
                let ids: Vec<_> = all.iter().map(|r| r.id).collect();
                assert_eq!(ids, vec![newest.id, middle.id, oldest.id], "{name}");

                let limited = store.recent(p, 2, None).unwrap();
                assert_eq!(limited.len(), 2, "{name}");

                let approved = store.recent(p, 1, Some(AuthorizationStatus::Approved)).unwrap();
                assert_eq!(approved.len(), 1, "{name}");
                assert_eq!(approved[0].id, newest.id, "{name}");

                assert!(store.recent(p, 0, None).unwrap().is_empty(), "{name}");
            }
        }

        #[test]
        fn test_record_roundtrip() {
            for (name, store) in backends() {
                let p = store.ensure_principal("alice").unwrap().id;
                let mut r = record(p, AuthorizationStatus::RequiresHumanApproval, 120.0, Duration::zero());
                r.merchant = Some("Acme".into());
                r.risk_score = Some(42);
                r.authorization_token = Some("tok".into());
                store.append(&r).unwrap();
                assert_eq!(store.get_record(p, r.id).unwrap().unwrap(), r, "{name}");
                assert!(store.get_record(Uuid::new_v4(), r.id).unwrap().is_none(), "{name}");
            }
        }

        #[test]
        fn test_mark_executed_rules() {
            for (name, store) in backends() {
                let p = store.ensure_principal("alice").unwrap().id;
                let approved = record(p, AuthorizationStatus::Approved, 10.0, Duration::zero());
                let caution = record(p, AuthorizationStatus::Caution, 60.0, Duration::zero());
                store.append(&approved).unwrap();
                store.append(&caution).unwrap();

                let done = store.mark_executed(p, approved.id).unwrap();
                assert!(done.was_executed, "{name}");
                assert!(store.get_record(p, approved.id).unwrap().unwrap().was_executed, "{name}");

                assert!(matches!(store.mark_executed(p, approved.id), Err(VetoError::Validation { .. })), "{name}");
                assert!(matches!(store.mark_executed(p, caution.id), Err(VetoError::Validation { .. })), "{name}");
                assert!(matches!(store.mark_executed(p, Uuid::new_v4()), Err(VetoError::NotFound(_))), "{name}");
                let other = store.ensure_principal("mallory").unwrap().id;
                assert!(matches!(store.mark_executed(other, approved.id), Err(VetoError::NotFound(_))), "{name}");
            }
        }

        #[test]
        fn test_duplicate_record_id_rejected() {
            for (name, store) in backends() {
                let p = store.ensure_principal("alice").unwrap().id;
                let r = record(p, AuthorizationStatus::Approved, 10.0, Duration::zero());
                store.append(&r).unwrap();
                assert!(matches!(store.append(&r), Err(VetoError::Storage(_))), "{name}");
                assert_eq!(store.recent(p, 10, None).unwrap().len(), 1, "{name}");
            }
        }

        #[test]
        fn test_interleaved_principals_stay_separate() {
            for (name, store) in backends() {
                let alice = store.ensure_principal("alice").unwrap().id;
                let bob = store.ensure_principal("bob").unwrap().id;
                let mut alice_ids = Vec::new();
                for i in 0..50 {
                    let owner = if i % 5 == 0 { alice } else { bob };
                    let mut r = record(owner, AuthorizationStatus::Approved, 1.0, Duration::minutes(100 - i));
                    r.was_executed = true;
                    store.append(&r).unwrap();
                    if owner == alice {
                        alice_ids.push(r.id);
                    }
                }

                let now = Utc::now();
                let alice_spend = store
                    .spend_entries(&SpendQuery::executed(alice, now - Duration::hours(24), now))
                    .unwrap();
                let bob_spend = store
                    .spend_entries(&SpendQuery::executed(bob, now - Duration::hours(24), now))
                    .unwrap();
                assert_eq!(alice_spend.len(), 10, "{name}");
                assert_eq!(bob_spend.len(), 40, "{name}");

                let history: Vec<_> = store.recent(alice, 50, None).unwrap().iter().map(|r| r.id).collect();
                alice_ids.reverse();
                assert_eq!(history, alice_ids, "{name}");
                assert!(store.get_record(bob, alice_ids[0]).unwrap().is_none(), "{name}");
            }
        }
    }

    // ── SQLite specifics ───────────────────────────────────────

    mod sqlite {
        use super::*;

        #[test]
        fn test_ledger_rows_are_append_only() {
            let store = SqliteStore::open_in_memory().unwrap();
            let p = store.ensure_principal("alice").unwrap().id;
            let r = record(p, AuthorizationStatus::Approved, 10.0, Duration::zero());
            store.append(&r).unwrap();

            let db = store.db();
            let changed_amount = db.execute(
                "UPDATE authorization_log SET amount = 1.0 WHERE id = ?1",
                rusqlite::params![r.id.to_string()],
            );
            assert!(changed_amount.is_err());
            let deleted = db.execute(
                "DELETE FROM authorization_log WHERE id = ?1",
                rusqlite::params![r.id.to_string()],
            );
            assert!(deleted.is_err());
        }

        #[test]
        fn test_settings_unique_per_principal() {
            let store = SqliteStore::open_in_memory().unwrap();
            let p = store.ensure_principal("alice").unwrap().id;
            store
                .insert_settings_if_absent(&PolicySettings::new(p, &PolicyDefaults::default(), Utc::now()))
                .unwrap();
            let db = store.db();
            let duplicate = db.execute(
                "INSERT INTO policy_settings (id, principal_id, single_transaction_limit, daily_limit,
                    weekly_limit, monthly_limit, require_approval_above, is_active, created_at, updated_at)
                 VALUES (?1, ?2, 1, 1, 1, 1, 1, 1, 'x', 'x')",
                rusqlite::params![Uuid::new_v4().to_string(), p.to_string()],
            );
            assert!(duplicate.is_err());
        }

        #[test]
        fn test_reopen_persists_to_disk() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("veto.db");
            let (principal, record_id) = {
                let store = SqliteStore::open(&path).unwrap();
                let p = store.ensure_principal("alice").unwrap();
                let r = record(p.id, AuthorizationStatus::Approved, 25.0, Duration::zero());
                store.append(&r).unwrap();
                (p, r.id)
            };

            let store = SqliteStore::open(&path).unwrap();
            assert_eq!(store.ensure_principal("alice").unwrap().id, principal.id);
            assert!(store.get_record(principal.id, record_id).unwrap().is_some());
        }

        #[test]
        fn test_concurrent_settings_creation_yields_one_row() {
            let dir = tempfile::tempdir().unwrap();
            let store = SqliteStore::open(&dir.path().join("veto.db")).unwrap();
            let p = store.ensure_principal("alice").unwrap().id;

            let ids: Vec<_> = std::thread::scope(|s| {
                let handles: Vec<_> = (0..8)
                    .map(|_| {
                        s.spawn(|| {
                            store
                                .insert_settings_if_absent(&PolicySettings::new(p, &PolicyDefaults::default(), Utc::now()))
                                .unwrap()
                                .id
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            assert!(ids.windows(2).all(|w| w[0] == w[1]));
        }
    }
}
