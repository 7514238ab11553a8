use std::sync::Arc;

use httptest::{matchers::request, responders::json_encoded, Expectation, Server};
use serde_json::json;
use statsig_local::{models::StatsigOptions, Client};

pub fn dcs_payload() -> serde_json::Value {
    json!({
        "dynamic_configs": [
            {
              "name": "test_dynamic_config",
              "type": "dynamic_config",
              "salt": "salt",
              "enabled": true,
              "defaultValue": {
                "value": "DEFAULT"
              },
              "rules": [
                {
                  "name": "test_reject_email_name",
                  "groupName": "test_reject_email",
                  "passPercentage": 0,
                  "conditions": [
                    {
                      "type": "user_field",
                      "targetValue": [
                        "test@example.com"
                      ],
                      "operator": "any",
                      "field": "email",
                      "additionalValues": {},
                      "idType": "userID"
                    }
                  ],
                  "returnValue": {
                    "value": "EMAIL"
                  },
                  "id": "id_reject_email",
                  "salt": "salt_email",
                  "idType": "userID"
                },
                {
                  "name": "test_1239_name",
                  "groupName": "test_1239",
                  "passPercentage": 100,
                  "conditions": [
                    {
                      "type": "user_field",
                      "targetValue": [
                        "1239"
                      ],
                      "operator": "any",
                      "field": "userID",
                      "additionalValues": {},
                      "idType": "userID"
                    },
                    {
                      "type": "user_field",
                      "targetValue": [
                        "secretid"
                      ],
                      "operator": "any",
                      "field": "secondaryId",
                      "additionalValues": {},
                      "idType": "userID"
                    }
                  ],
                  "returnValue": {
                    "value": "1239"
                  },
                  "id": "id_1239_name",
                  "salt": "salt_1239",
                  "idType": "userID"
                },
              ],
              "idType": "userID",
              "entity": "dynamic_config"
            }
        ],
        "feature_gates": [
            {
                "name": "test_gate",
                "type": "feature_gate",
                "salt": "salt",
                "enabled": true,
                "defaultValue": false,
                "idType": "userID",
                "rules": [{
                    "name": "public",
                    "groupName": "public",
                    "id": "public1",
                    "salt": "salt_rule",
                    "passPercentage": 100,
                    "idType": "userID",
                    "returnValue": true,
                    "conditions": [{
                        "type": "public",
                        "idType": "userID",
                    }],
                }],
            },
            {
                "name": "test_gate_nobody",
                "type": "feature_gate",
                "salt": "salt",
                "enabled": true,
                "defaultValue": false,
                "idType": "userID",
                "rules": [{
                    "name": "public",
                    "groupName": "public",
                    "id": "nobody1",
                    "salt": "salt_rule",
                    "passPercentage": 0,
                    "idType": "userID",
                    "returnValue": true,
                    "conditions": [{
                        "type": "public",
                        "idType": "userID",
                    }],
                }],
            }
        ],
        "layer_configs": [],
        "has_updates": true,
        "time": 1000,
    })
}

pub fn expect_fetch_config_specs(server: &Server, payload: serde_json::Value) {
    server.expect(
        Expectation::matching(request::method_path(
            "GET",
            "/download_config_specs/secret-key.json",
        ))
        .times(..)
        .respond_with(json_encoded(payload)),
    );
}

pub fn expect_get_id_lists(server: &Server, manifest: serde_json::Value) {
    server.expect(
        Expectation::matching(request::method_path("POST", "/get_id_lists"))
            .times(..)
            .respond_with(json_encoded(manifest)),
    );
}

pub fn expect_log_events(server: &Server) {
    server.expect(
        Expectation::matching(request::method_path("POST", "/log_event"))
            .times(..)
            .respond_with(json_encoded(json!({}))),
    );
}

pub fn options_for(server: &Server) -> StatsigOptions {
    let url = format!("http://{}", server.addr());
    StatsigOptions {
        api_url: Some(url.clone()),
        api_for_download_config_specs: Some(url.clone()),
        events_url: Some(url),
        disable_rulesets_sync: true,
        disable_id_lists_sync: true,
        ..Default::default()
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct ConfigValue {
    pub value: String,
}

pub async fn create_client() -> Arc<Client> {
    let http_server = Server::run();
    expect_fetch_config_specs(&http_server, dcs_payload());
    expect_get_id_lists(&http_server, json!({}));
    expect_log_events(&http_server);

    Client::new("secret-key".to_string(), options_for(&http_server))
        .await
        .expect("should be able to create statsig client")
}
