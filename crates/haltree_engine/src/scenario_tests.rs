/* 📖 # Why end-to-end scenarios in their own file?

These tests drive complete requests (path, verb, query, body) through resolution,
dispatch and rendering against the deployment fixture, and compare whole documents.
They read best as a catalogue of request/response pairs, separate from the unit tests
next to each module.
*/

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use haltree_base::HaltreeResult;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use crate::ops::{
        InputRole, OperationContract, OperationName, OperationRegistry, Payload, Receiver,
    };
    use crate::schema::{Entity, SchemaCompiler, TypeBuilder};
    use crate::test_fixtures::{self, TestRequest};

    #[test]
    fn test_root_embeds_pools_and_their_apps() {
        test_fixtures::seed();
        let reply = TestRequest::get("/").send(&test_fixtures::schema());
        assert_eq!(reply.status, 200);
        assert_eq!(
            reply.document,
            json!({
                "hello": "world",
                "_links": {
                    "self": {"href": "/"},
                    "motd": {"href": "/motd"}
                },
                "_embedded": {
                    "pools": {
                        "_links": {"self": {"href": "/pools"}},
                        "_embedded": {
                            "pools": [
                                {
                                    "name": "p1",
                                    "env": "prod",
                                    "_links": {"self": {"href": "/pools/p1"}},
                                    "_embedded": {
                                        "apps": {
                                            "_links": {"self": {"href": "/pools/p1/apps"}},
                                            "_embedded": {
                                                "apps": [{
                                                    "name": "a1",
                                                    "image": "nginx",
                                                    "_links": {
                                                        "self": {"href": "/pools/p1/apps/a1"},
                                                        "versions": {"href": "/pools/p1/apps/a1/versions"}
                                                    }
                                                }]
                                            }
                                        }
                                    }
                                },
                                {
                                    "name": "p2",
                                    "env": "staging",
                                    "_links": {"self": {"href": "/pools/p2"}},
                                    "_embedded": {
                                        "apps": {
                                            "_links": {"self": {"href": "/pools/p2/apps"}}
                                        }
                                    }
                                }
                            ]
                        }
                    }
                }
            })
        );
        assert!(reply.document.get("pools").is_none());
        assert!(reply.document.get("motd").is_none());
    }

    #[test]
    fn test_field_selector_drops_unselected_embeds() {
        test_fixtures::seed();
        let reply = TestRequest::get("/pools/p1?fields=name").send(&test_fixtures::schema());
        assert_eq!(reply.status, 200);
        assert_eq!(
            reply.document,
            json!({"name": "p1", "_links": {"self": {"href": "/pools/p1"}}})
        );
    }

    #[test]
    fn test_field_selector_reaches_into_embeds() {
        test_fixtures::seed();
        let reply =
            TestRequest::get("/pools/p1?fields=env,apps.image").send(&test_fixtures::schema());
        assert_eq!(
            reply.document,
            json!({
                "env": "prod",
                "_links": {"self": {"href": "/pools/p1"}},
                "_embedded": {
                    "apps": {
                        "_links": {"self": {"href": "/pools/p1/apps"}},
                        "_embedded": {
                            "apps": [{
                                "image": "nginx",
                                "_links": {
                                    "self": {"href": "/pools/p1/apps/a1"},
                                    "versions": {"href": "/pools/p1/apps/a1/versions"}
                                }
                            }]
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn test_empty_selector_matches_wildcard() {
        test_fixtures::seed();
        let schema = test_fixtures::schema();
        assert_eq!(
            TestRequest::get("/pools/p1?fields=").send(&schema),
            TestRequest::get("/pools/p1?fields=*").send(&schema)
        );
    }

    #[test]
    fn test_zero_singular_is_not_found() {
        test_fixtures::seed();
        let schema = test_fixtures::schema();
        let reply = TestRequest::get("/motd").send(&schema);
        assert_eq!(reply.status, 404);
        assert_eq!(reply.document, json!({"error": "Not found."}));

        test_fixtures::set_motd("deploy freeze");
        let reply = TestRequest::get("/MOTD").send(&schema);
        assert_eq!(reply.status, 200);
        assert_eq!(
            reply.document,
            json!({"text": "deploy freeze", "_links": {"self": {"href": "/motd"}}})
        );
    }

    #[test]
    fn test_unknown_paths_are_not_found() {
        test_fixtures::seed();
        let schema = test_fixtures::schema();
        let reply = TestRequest::get("/pools/p9").send(&schema);
        assert_eq!(reply.status, 404);
        assert_eq!(
            reply.document,
            json!({"error": "collection 'pools' does not have an item with ID 'p9'"})
        );
        assert_eq!(TestRequest::get("/hello").send(&schema).status, 404);
        assert_eq!(
            TestRequest::get("/pools/p1/apps/a9/versions")
                .send(&schema)
                .status,
            404
        );
    }

    #[test]
    fn test_items_share_the_collection_selector() {
        test_fixtures::seed();
        let schema = test_fixtures::schema();
        let reply = TestRequest::get("/pools?fields=name").send(&schema);
        assert_eq!(
            reply.document["_embedded"]["pools"],
            json!([
                {"name": "p1", "_links": {"self": {"href": "/pools/p1"}}},
                {"name": "p2", "_links": {"self": {"href": "/pools/p2"}}}
            ])
        );

        // Items are not narrowed by the collection's own relation
        let reply = TestRequest::get("/pools?fields=pools.name").send(&schema);
        assert_eq!(
            reply.document["_embedded"]["pools"],
            json!([
                {"_links": {"self": {"href": "/pools/p1"}}},
                {"_links": {"self": {"href": "/pools/p2"}}}
            ])
        );
    }

    #[test]
    fn test_ids_are_percent_decoded_and_links_encoded() {
        test_fixtures::seed();
        let schema = test_fixtures::schema();
        let reply = TestRequest::put("/pools/my%20pool", json!({"env": "dev"})).send(&schema);
        assert_eq!(reply.status, 201);
        assert_eq!(reply.document["name"], json!("my pool"));
        assert_eq!(
            reply.document["_links"]["self"],
            json!({"href": "/pools/my%20pool"})
        );
        assert_eq!(test_fixtures::pool_names(), ["my pool", "p1", "p2"]);

        let reply = TestRequest::get("/pools/my%20pool").send(&schema);
        assert_eq!(reply.status, 200);
        assert_eq!(reply.document["env"], json!("dev"));
    }

    #[test]
    fn test_empty_segments() {
        test_fixtures::seed();
        let schema = test_fixtures::schema();
        assert_eq!(TestRequest::get("/pools/p1/").send(&schema).status, 200);
        let reply = TestRequest::get("/pools//p1").send(&schema);
        assert_eq!(reply.status, 404);
        assert_eq!(
            reply.document,
            json!({"error": "collection 'pools' does not have an item with ID ''"})
        );
    }

    #[test]
    fn test_unknown_path_is_not_found_for_any_verb() {
        test_fixtures::seed();
        let reply = TestRequest::new("DELETE", "/nope/nothing").send(&test_fixtures::schema());
        assert_eq!(reply.status, 404);
        assert_eq!(reply.allow, None);
        assert_eq!(
            reply.document,
            json!({"error": "Root (/) does not have a member called 'nope'"})
        );
    }

    #[test]
    fn test_put_without_write_is_method_not_allowed() {
        test_fixtures::seed();
        let reply = TestRequest::put("/", json!({"hello": "mars"})).send(&test_fixtures::schema());
        assert_eq!(reply.status, 405);
        assert_eq!(reply.allow.as_deref(), Some("GET"));
        assert_eq!(
            reply.document,
            json!({"error": "/ does not support method PUT; it does support: GET"})
        );
    }

    #[test]
    fn test_unsupported_verb_lists_allowed_methods() {
        test_fixtures::seed();
        let reply = TestRequest::new("POST", "/pools/p1/apps/a1").send(&test_fixtures::schema());
        assert_eq!(reply.status, 405);
        assert_eq!(reply.allow.as_deref(), Some("GET, PUT"));
    }

    #[test]
    fn test_put_creates_then_conflicts() {
        test_fixtures::seed();
        let schema = test_fixtures::schema();
        let reply = TestRequest::put("/pools/p3", json!({"env": "dev"})).send(&schema);
        assert_eq!(reply.status, 201);
        assert_eq!(
            reply.document,
            json!({
                "name": "p3",
                "env": "dev",
                "_links": {"self": {"href": "/pools/p3"}},
                "_embedded": {
                    "apps": {"_links": {"self": {"href": "/pools/p3/apps"}}}
                }
            })
        );
        assert_eq!(test_fixtures::pool_names(), ["p1", "p2", "p3"]);

        let reply = TestRequest::put("/pools/p1", json!({"env": "dev"})).send(&schema);
        assert_eq!(reply.status, 409);
        assert_eq!(reply.document, json!({"error": "Pool p1 already exists."}));
        assert_eq!(test_fixtures::stored_pool("p1").unwrap().env, "prod");
        assert_eq!(test_fixtures::pool_names(), ["p1", "p2", "p3"]);
    }

    #[test]
    fn test_put_on_existing_item_is_ok() {
        test_fixtures::seed();
        let schema = test_fixtures::schema();
        let reply =
            TestRequest::put("/pools/p1/apps/a1", json!({"image": "redis"})).send(&schema);
        assert_eq!(reply.status, 200);
        assert_eq!(reply.document["image"], json!("redis"));

        let reply =
            TestRequest::put("/pools/p1/apps/a2", json!({"image": "redis"})).send(&schema);
        assert_eq!(reply.status, 201);
        assert_eq!(
            reply.document["_links"]["versions"],
            json!({"href": "/pools/p1/apps/a2/versions"})
        );
    }

    #[test]
    fn test_put_requires_a_body() {
        test_fixtures::seed();
        let reply = TestRequest::new("PUT", "/pools/p4").send(&test_fixtures::schema());
        assert_eq!(reply.status, 400);
        assert_eq!(
            reply.document,
            json!({"error": "Pool.Write requires a request body"})
        );
        assert!(test_fixtures::stored_pool("p4").is_none());
    }

    #[test]
    fn test_put_with_mismatched_body_is_a_bad_request() {
        test_fixtures::seed();
        let reply =
            TestRequest::put("/pools/p4", json!({"env": 42})).send(&test_fixtures::schema());
        assert_eq!(reply.status, 400);
        let message = reply.document["error"].as_str().unwrap().to_string();
        assert!(message.starts_with("request body does not match Pool"));
    }

    #[test]
    fn test_linked_collection() {
        test_fixtures::seed();
        let schema = test_fixtures::schema();
        let reply = TestRequest::get("/pools/p1/apps/a1/versions").send(&schema);
        assert_eq!(
            reply.document,
            json!({
                "_links": {"self": {"href": "/pools/p1/apps/a1/versions"}},
                "_embedded": {
                    "versions": [{
                        "number": "1.0",
                        "instances": 2,
                        "_links": {"self": {"href": "/pools/p1/apps/a1/versions/1.0"}}
                    }]
                }
            })
        );

        let reply =
            TestRequest::put("/pools/p1/apps/a1/versions/1.0", json!({"instances": 5}))
                .send(&schema);
        assert_eq!(reply.status, 409);
        assert_eq!(reply.document, json!({"error": "Version 1.0 already exists."}));
    }

    #[test]
    fn test_page_query_reaches_terminal_collection_only() {
        test_fixtures::seed();
        let schema = test_fixtures::schema();
        assert_eq!(TestRequest::get("/pools?page=3").send(&schema).status, 200);
        assert_eq!(test_fixtures::last_pools_page(), 3);

        assert_eq!(TestRequest::get("/pools/p1?page=3").send(&schema).status, 200);
        assert_eq!(test_fixtures::last_pools_page(), 0);

        let reply = TestRequest::get("/pools?page=two").send(&schema);
        assert_eq!(reply.status, 400);
        assert_eq!(
            reply.document,
            json!({"error": "Page number 'two' not recognised; expected integer"})
        );
    }

    thread_local! {
        static TALLY: Cell<i64> = const { Cell::new(0) };
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Tally {
        count: i64,
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Delta {
        by: i64,
    }

    impl Tally {
        fn manifest(&mut self) -> HaltreeResult<()> {
            self.count = TALLY.with(Cell::get);
            Ok(())
        }

        fn add(&mut self, delta: Payload<Delta>) -> HaltreeResult<()> {
            self.count += delta.by;
            TALLY.with(|tally| tally.set(self.count));
            Ok(())
        }
    }

    impl Entity for Tally {
        fn describe(ty: &mut TypeBuilder<Self>) {
            ty.manifest(Tally::manifest).write(Tally::add);
        }
    }

    impl Entity for Delta {
        fn describe(_: &mut TypeBuilder<Self>) {}
    }

    #[test]
    fn test_custom_registry_with_manifested_receiver() {
        TALLY.with(|tally| tally.set(0));
        let registry = OperationRegistry::builtin().with_contract(
            OperationContract::on(OperationName::Write, Receiver::Manifested)
                .inputs(&[InputRole::Payload])
                .optional(&[InputRole::Id]),
        );
        let schema = SchemaCompiler::new(registry).compile::<Tally>().unwrap();

        let reply = TestRequest::put("/", json!({"by": 3})).send(&schema);
        assert_eq!(reply.status, 201);
        assert_eq!(
            reply.document,
            json!({"count": 3, "_links": {"self": {"href": "/"}}})
        );

        let reply = TestRequest::put("/", json!({"by": 4})).send(&schema);
        assert_eq!(reply.status, 200);
        assert_eq!(reply.document["count"], json!(7));
    }
}
