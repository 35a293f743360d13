#[cfg(test)]
mod tests_impl {
    use crate::core::chains::ChainStore;
    use crate::core::error::Error;
    use crate::core::firewall::{
        Action, Protocol, Rule, RuleRecord, RuleStore, parse_action, parse_protocol,
    };
    use crate::core::persistence::{self, DuplicatePolicy, IMPORTED_COMMENT, LoadOutcome};
    use crate::core::test_helpers::{create_test_rule, create_test_store};
    use crate::validators::MATCH_ALL;
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;

    fn ipv4_network() -> impl Strategy<Value = String> {
        (any::<[u8; 4]>(), proptest::option::of(0u8..=32)).prop_map(|(octets, prefix)| {
            let addr = format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3]);
            match prefix {
                Some(p) => format!("{addr}/{p}"),
                None => addr,
            }
        })
    }

    fn address() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            Just("any".to_string()),
            Just("ANY".to_string()),
            ipv4_network(),
        ]
    }

    fn protocol() -> impl Strategy<Value = Protocol> {
        prop_oneof![Just(Protocol::Tcp), Just(Protocol::Udp), Just(Protocol::Icmp)]
    }

    fn action() -> impl Strategy<Value = Action> {
        prop_oneof![Just(Action::Accept), Just(Action::Drop), Just(Action::Reject)]
    }

    fn rule() -> impl Strategy<Value = Rule> {
        (
            protocol(),
            address(),
            address(),
            action(),
            proptest::option::of("[a-zA-Z0-9 #()._-]{0,40}"),
            0i64..4_102_444_800,
            0u32..1_000_000_000,
        )
            .prop_map(|(p, s, d, a, comment, secs, nanos)| {
                let ts = DateTime::<Utc>::from_timestamp(secs, nanos).unwrap();
                Rule::with_timestamp(p, &s, &d, a, comment.as_deref(), ts).unwrap()
            })
    }

    proptest! {
        #[test]
        fn prop_addresses_canonicalize(p in protocol(), s in address(), d in address(), a in action()) {
            let rule = Rule::new(p, &s, &d, a, None).unwrap();
            let expect = |input: &str| {
                if input.is_empty() || input.eq_ignore_ascii_case("any") {
                    MATCH_ALL.to_string()
                } else {
                    input.to_string()
                }
            };
            prop_assert_eq!(rule.source(), expect(&s));
            prop_assert_eq!(rule.destination(), expect(&d));
        }

        #[test]
        fn prop_serializable_round_trip(rules in proptest::collection::vec(rule(), 0..12)) {
            let mut store = RuleStore::new();
            for r in rules {
                store.append(r);
            }
            let restored = RuleStore::from_serializable(&store.to_serializable()).unwrap();
            prop_assert_eq!(restored, store);
        }

        #[test]
        fn prop_rule_text_parses_back(r in rule()) {
            let reparsed = Rule::parse(&r.to_string(), r.comment(), r.created_at()).unwrap();
            prop_assert_eq!(reparsed, r);
        }
    }

    #[test]
    fn test_invalid_protocol_and_action_rejected() {
        for bad in ["sctp", "", "tcpp", "all"] {
            assert!(matches!(
                parse_protocol(bad),
                Err(Error::Validation { ref field, .. }) if field == "protocol"
            ));
        }
        for bad in ["LOG", "allow", "", "RETURN"] {
            assert!(matches!(
                parse_action(bad),
                Err(Error::Validation { ref field, .. }) if field == "action"
            ));
        }
        assert_eq!(parse_protocol(" TCP ").unwrap(), Protocol::Tcp);
        assert_eq!(parse_action("drop").unwrap(), Action::Drop);
    }

    #[test]
    fn test_invalid_address_rejected() {
        let err = Rule::new(Protocol::Tcp, "10.0.0.999", "any", Action::Accept, None).unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "source"));
    }

    #[test]
    fn test_rule_parse_accepts_long_flags_in_any_order() {
        let r = Rule::parse(
            "--jump drop --destination 10.0.0.0/24 --protocol UDP --source any",
            None,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(r.to_string(), "-p udp -s 0.0.0.0/0 -d 10.0.0.0/24 -j DROP");
    }

    #[test]
    fn test_rule_parse_reports_missing_and_unknown_flags() {
        let now = Utc::now();
        assert!(Rule::parse("-p tcp -s any -d any", None, now).is_err());
        assert!(Rule::parse("-p tcp -s any -d any -j ACCEPT --dport 22", None, now).is_err());
        assert!(Rule::parse("-p tcp -p udp -s any -d any -j ACCEPT", None, now).is_err());
        assert!(Rule::parse("-p tcp -s any -d any -j", None, now).is_err());
    }

    #[test]
    fn test_empty_comment_is_absent() {
        let r = create_test_rule("any", Some("   "));
        assert_eq!(r.comment(), None);
        assert_eq!(r.to_record().comment, "");
    }

    #[test]
    fn test_from_serializable_is_all_or_nothing() {
        let mut records = create_test_store(3).to_serializable();
        records[1].rule = "-p tcp -s any -d any -j LOG".to_string();

        let err = RuleStore::from_serializable(&records).unwrap_err();
        match err {
            Error::DataFormat { source_name, .. } => assert_eq!(source_name, "rule record 2"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_serializable_rejects_bad_timestamp() {
        let records = vec![RuleRecord {
            rule: "-p tcp -s any -d any -j ACCEPT".to_string(),
            comment: String::new(),
            timestamp: "yesterday".to_string(),
        }];
        assert!(matches!(
            RuleStore::from_serializable(&records),
            Err(Error::DataFormat { .. })
        ));
    }

    #[tokio::test]
    async fn test_structured_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(persistence::DEFAULT_RULES_FILE);

        let rules = create_test_store(3);
        let mut chains = ChainStore::new();
        chains.create("web").unwrap();
        chains.add_rule("web", "-p tcp --dport 443 -j ACCEPT").unwrap();
        chains.create("empty").unwrap();

        persistence::save_structured(&path, &rules, &chains).await.unwrap();
        assert!(dir.path().join("firewall_rules.json.sha256").exists());

        match persistence::load_structured(&path).await.unwrap() {
            LoadOutcome::Loaded {
                rules: loaded_rules,
                chains: loaded_chains,
            } => {
                assert_eq!(loaded_rules, rules);
                assert_eq!(loaded_chains, chains);
            }
            LoadOutcome::Missing => panic!("file should exist"),
        }
    }

    #[tokio::test]
    async fn test_structured_file_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");

        let mut chains = ChainStore::new();
        chains.create("web").unwrap();
        persistence::save_structured(&path, &create_test_store(1), &chains)
            .await
            .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["rules"][0]["rule"], "-p tcp -s 10.0.0.1 -d 0.0.0.0/0 -j DROP");
        assert_eq!(json["rules"][0]["comment"], "test rule");
        assert!(json["rules"][0]["timestamp"].is_string());
        assert!(json["chains"]["web"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = persistence::load_structured(&dir.path().join("nope.json"))
            .await
            .unwrap();
        assert!(matches!(outcome, LoadOutcome::Missing));
    }

    #[tokio::test]
    async fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");

        for contents in ["{ not json", "{\"rules\": 5}", "{\"chains\": []}", "42"] {
            std::fs::write(&path, contents).unwrap();
            let result = persistence::load_structured(&path).await;
            assert!(
                matches!(result, Err(Error::DataFormat { .. })),
                "{contents} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_load_legacy_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");

        // Plain list of rule strings
        std::fs::write(&path, r#"["-p tcp -s any -d 0.0.0.0/0 -j ACCEPT"]"#).unwrap();
        let LoadOutcome::Loaded { rules, chains } =
            persistence::load_structured(&path).await.unwrap()
        else {
            panic!("expected loaded");
        };
        assert_eq!(rules.len(), 1);
        assert!(chains.is_empty());

        // Rules as strings plus chains
        std::fs::write(
            &path,
            r#"{"rules": ["-p udp -s 10.0.0.0/8 -d any -j DROP"], "chains": {"dns": ["-p udp --dport 53 -j ACCEPT"]}}"#,
        )
        .unwrap();
        let LoadOutcome::Loaded { rules, chains } =
            persistence::load_structured(&path).await.unwrap()
        else {
            panic!("expected loaded");
        };
        assert_eq!(
            rules.iter().next().unwrap().to_string(),
            "-p udp -s 10.0.0.0/8 -d 0.0.0.0/0 -j DROP"
        );
        assert_eq!(chains.list_rules("dns").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_chains_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, r#"{"chains": {"web": ["-p tcp --dport 80 -j ACCEPT"]}}"#).unwrap();

        let LoadOutcome::Loaded { rules, chains } =
            persistence::load_structured(&path).await.unwrap()
        else {
            panic!("expected loaded");
        };
        assert!(rules.is_empty());
        assert_eq!(
            chains.list_rules("web").unwrap(),
            ["-p tcp --dport 80 -j ACCEPT"]
        );
    }

    #[tokio::test]
    async fn test_save_succeeds_when_checksum_cannot_be_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        // A directory in the sidecar's place makes the checksum rename fail
        std::fs::create_dir(dir.path().join("rules.json.sha256")).unwrap();

        persistence::save_structured(&path, &create_test_store(2), &ChainStore::new())
            .await
            .unwrap();

        let LoadOutcome::Loaded { rules, .. } = persistence::load_structured(&path).await.unwrap()
        else {
            panic!("expected loaded");
        };
        assert_eq!(rules.len(), 2);
    }

    #[tokio::test]
    async fn test_load_tolerates_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        persistence::save_structured(&path, &create_test_store(1), &ChainStore::new())
            .await
            .unwrap();
        std::fs::write(dir.path().join("rules.json.sha256"), "deadbeef").unwrap();

        assert!(matches!(
            persistence::load_structured(&path).await.unwrap(),
            LoadOutcome::Loaded { .. }
        ));
    }

    #[tokio::test]
    async fn test_export_import_bare_rule() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(persistence::DEFAULT_BACKUP_FILE);
        let text = "-p tcp -s 0.0.0.0/0 -d 0.0.0.0/0 -j ACCEPT";

        let mut store = RuleStore::new();
        store.append(Rule::new(Protocol::Tcp, "any", "any", Action::Accept, None).unwrap());
        assert_eq!(persistence::export_backup(&path, &store).await.unwrap(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), format!("{text}\n"));

        let mut imported = RuleStore::new();
        let summary = persistence::import_backup(&path, &mut imported, DuplicatePolicy::Keep)
            .await
            .unwrap();
        assert_eq!(summary.imported, 1);

        let rule = imported.iter().next().unwrap();
        assert_eq!(rule.to_string().as_bytes(), text.as_bytes());
        assert_eq!(rule.comment(), Some(IMPORTED_COMMENT));
    }

    #[tokio::test]
    async fn test_export_import_keeps_comment_and_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.txt");
        let ts = DateTime::parse_from_rfc3339("2024-06-30T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let mut store = RuleStore::new();
        store.append(
            Rule::with_timestamp(
                Protocol::Icmp,
                "any",
                "192.168.0.0/16",
                Action::Reject,
                Some("no ping"),
                ts,
            )
            .unwrap(),
        );
        persistence::export_backup(&path, &store).await.unwrap();

        let mut imported = RuleStore::new();
        persistence::import_backup(&path, &mut imported, DuplicatePolicy::Keep)
            .await
            .unwrap();
        assert_eq!(imported, store);
    }

    #[tokio::test]
    async fn test_import_skips_blank_lines_and_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.txt");
        std::fs::write(
            &path,
            "\n-p tcp -s 10.0.0.9 -d any -j ACCEPT  # first\n   \n-p udp -s any -d any -j DROP\n",
        )
        .unwrap();

        let mut store = create_test_store(1);
        let summary = persistence::import_backup(&path, &mut store, DuplicatePolicy::Keep)
            .await
            .unwrap();

        assert_eq!(summary.imported, 2);
        let texts: Vec<String> = store.iter().map(ToString::to_string).collect();
        assert_eq!(
            texts,
            [
                "-p tcp -s 10.0.0.1 -d 0.0.0.0/0 -j DROP",
                "-p tcp -s 10.0.0.9 -d 0.0.0.0/0 -j ACCEPT",
                "-p udp -s 0.0.0.0/0 -d 0.0.0.0/0 -j DROP",
            ]
        );
        assert_eq!(store.iter().nth(1).unwrap().comment(), Some("first"));
    }

    #[tokio::test]
    async fn test_import_skips_comment_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.txt");
        std::fs::write(
            &path,
            "# backup of web server\n  # second note\n-p tcp -s any -d any -j ACCEPT\n-p tcp -s any -d any\n",
        )
        .unwrap();

        let mut store = RuleStore::new();
        let err = persistence::import_backup(&path, &mut store, DuplicatePolicy::Keep)
            .await
            .unwrap_err();
        // Line numbers still count the skipped notes
        assert!(matches!(err, Error::DataFormat { ref message, .. } if message.starts_with("line 4")));

        std::fs::write(&path, "# backup of web server\n-p tcp -s any -d any -j ACCEPT\n").unwrap();
        let summary = persistence::import_backup(&path, &mut store, DuplicatePolicy::Keep)
            .await
            .unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_import_skip_matches_canonical_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.txt");
        std::fs::write(&path, "-p tcp -s any -d 10.0.0.1 -j DROP\n").unwrap();

        let mut store = RuleStore::new();
        let canonical = Rule::new(Protocol::Tcp, "0.0.0.0/0", "10.0.0.1", Action::Drop, None);
        store.append(canonical.unwrap());
        let summary = persistence::import_backup(&path, &mut store, DuplicatePolicy::Skip)
            .await
            .unwrap();

        assert_eq!(summary.skipped_duplicates, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_import_duplicate_policies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.txt");
        let store = create_test_store(2);
        persistence::export_backup(&path, &store).await.unwrap();
        // A repeated line inside the file itself
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("-p udp -s any -d any -j ACCEPT\n-p udp -s any -d any -j ACCEPT\n");
        std::fs::write(&path, content).unwrap();

        let mut skipping = store.clone();
        let summary = persistence::import_backup(&path, &mut skipping, DuplicatePolicy::Skip)
            .await
            .unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.skipped_duplicates, 3);
        assert_eq!(skipping.len(), 3);

        let mut keeping = store.clone();
        let summary = persistence::import_backup(&path, &mut keeping, DuplicatePolicy::Keep)
            .await
            .unwrap();
        assert_eq!(summary.imported, 4);
        assert_eq!(keeping.len(), 6);
    }

    #[tokio::test]
    async fn test_import_malformed_line_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.txt");
        std::fs::write(&path, "-p tcp -s any -d any -j ACCEPT\nsudo iptables -F\n").unwrap();

        let mut store = create_test_store(1);
        let before = store.clone();
        let err = persistence::import_backup(&path, &mut store, DuplicatePolicy::Keep)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DataFormat { ref message, .. } if message.starts_with("line 2")));
        assert_eq!(store, before);
    }

    #[tokio::test]
    async fn test_import_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RuleStore::new();
        let err = persistence::import_backup(
            &dir.path().join("nope.txt"),
            &mut store,
            DuplicatePolicy::Skip,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::MissingFile(_)));
    }
}
