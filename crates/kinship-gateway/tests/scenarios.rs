//! End-to-end flows through the router with a running world loop, an
//! in-memory store and web sessions backed by plain channels.

use std::sync::Arc;
use std::time::Duration;

use kinship_common::auth::Credentials;
use kinship_common::envelope::EventEnvelope;
use kinship_common::models::Identity;
use kinship_common::ranks::NoRanks;
use kinship_db::Database;
use kinship_gateway::world::WorldLine;
use kinship_gateway::{Command, LocalRoster, LocalWorld, Origin, Router, SessionRegistry, WorldLoop};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

struct Harness {
    router: Router,
    roster: LocalRoster,
}

struct WebClient {
    session_id: String,
    rx: mpsc::Receiver<EventEnvelope>,
}

impl WebClient {
    fn drain(&mut self) -> Vec<EventEnvelope> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Harness {
    fn new() -> Self {
        let config = kinship_common::config::load("does-not-exist").unwrap();
        let roster = LocalRoster::default();
        let (world_loop, world) = WorldLoop::with_limits(
            LocalWorld::new(roster.clone()),
            1024,
            256,
            Duration::from_millis(1),
        );
        // Exits once the router, and with it the last handle, is dropped.
        world_loop.spawn().unwrap();

        let router = Router::new(
            Database::memory(),
            &config,
            Arc::new(SessionRegistry::new()),
            world,
            Arc::new(NoRanks),
        )
        .unwrap();
        Self { router, roster }
    }

    /// A player who is standing in the world.
    async fn in_world(&self, name: &str) -> Identity {
        let player = Identity::new(Uuid::new_v4(), name);
        self.roster.join(player.id);
        self.router.world_join(&player).await.unwrap();
        player
    }

    /// A player who only ever connects from the web.
    async fn web_only(&self, name: &str) -> (Identity, WebClient) {
        let player = Identity::new(Uuid::new_v4(), name);
        let reply = self
            .run(&player, json!({"type": "set_web_password", "data": {"password": "s3cret"}}))
            .await;
        assert_eq!(reply["success"], true, "{reply}");

        let (tx, rx) = mpsc::channel(64);
        let session_id = self.router.sessions().register(Some(tx)).await;
        let credentials = Credentials {
            username: name.to_lowercase(),
            password: "s3cret".into(),
        };
        let identity = self
            .router
            .authenticate(&session_id, &credentials)
            .await
            .unwrap();
        assert_eq!(identity, player);
        (player, WebClient { session_id, rx })
    }

    /// Run a command as an in-world player.
    async fn run(&self, player: &Identity, command: Value) -> Value {
        self.router
            .dispatch(&Origin::World(player.clone()), parse(command))
            .await
    }

    /// Run a command from a web session.
    async fn run_web(&self, client: &WebClient, command: Value) -> Value {
        self.router
            .dispatch(&Origin::web(&client.session_id), parse(command))
            .await
    }

    /// Wait for the world loop to deliver a line matching `pred`.
    async fn line_for(&self, player: Uuid, pred: impl Fn(&WorldLine) -> bool) -> WorldLine {
        for _ in 0..200 {
            if let Some(line) = self.roster.lines_for(player).into_iter().find(|l| pred(l)) {
                return line;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no matching world line for {player}");
    }
}

fn parse(command: Value) -> Command {
    serde_json::from_value(command).unwrap()
}

fn ok(reply: Value) -> Value {
    assert_eq!(reply["success"], true, "{reply}");
    reply["data"].clone()
}

fn error_kind(reply: &Value) -> &str {
    assert_eq!(reply["success"], false, "{reply}");
    reply["error"]["kind"].as_str().unwrap()
}

#[tokio::test]
async fn friend_request_then_accept_across_channels() {
    let h = Harness::new();
    let alex = h.in_world("Alex").await;
    let (blair, mut web) = h.web_only("Blair").await;

    ok(h.run(&alex, json!({"type": "friend_request", "data": {"player": "Blair"}})).await);
    let events = web.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "friend_request");
    assert_eq!(events[0].data["from"]["name"], "Alex");

    let again = h.run(&alex, json!({"type": "friend_request", "data": {"player": "Blair"}})).await;
    assert_eq!(error_kind(&again), "already_exists");

    ok(h.run_web(&web, json!({"type": "friend_accept", "data": {"player": "alex"}})).await);
    h.line_for(alex.id, |l| l.text.contains("Blair accepted your friend request"))
        .await;

    let router = &h.router;
    assert!(router.relationships().are_friends(alex.id, blair.id).await.unwrap());
    assert!(router.relationships().are_friends(blair.id, alex.id).await.unwrap());
    assert!(router.relationships().pending_outgoing(alex.id).await.unwrap().is_empty());

    let friends = ok(h.run_web(&web, json!({"type": "get_friends"})).await);
    assert_eq!(friends[0]["name"], "Alex");
    assert_eq!(friends[0]["online"], true);

    let friends = ok(h.run(&alex, json!({"type": "get_friends"})).await);
    assert_eq!(friends[0]["name"], "Blair");
    assert_eq!(friends[0]["online"], true);
}

#[tokio::test]
async fn capacity_two_group_rejects_a_third_member() {
    let h = Harness::new();
    let alex = h.in_world("Alex").await;
    let blair = h.in_world("Blair").await;
    let casey = h.in_world("Casey").await;

    let group = ok(h
        .run(&alex, json!({"type": "group_create", "data": {"name": "Duo", "max_members": 2}}))
        .await);
    assert_eq!(group["maxMembers"], 2);

    for name in ["Blair", "Casey"] {
        ok(h
            .run(&alex, json!({"type": "group_invite", "data": {"group": "Duo", "player": name}}))
            .await);
    }

    ok(h.run(&blair, json!({"type": "group_invite_accept", "data": {"group": "Duo"}})).await);

    let full = h
        .run(&casey, json!({"type": "group_invite_accept", "data": {"group": "Duo"}}))
        .await;
    assert_eq!(error_kind(&full), "full");

    let view = ok(h.run(&alex, json!({"type": "get_group", "data": {"group": "Duo"}})).await);
    let members = view["members"].as_array().unwrap();
    assert_eq!(members.len(), 2);
    assert!(members.iter().all(|m| m["name"] != "Casey"));

    // The invite survives so Casey can join once a slot frees up.
    let invites = ok(h.run(&casey, json!({"type": "get_group_invites"})).await);
    assert_eq!(invites.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn moderator_cannot_kick_admin() {
    let h = Harness::new();
    let alex = h.in_world("Alex").await;
    let blair = h.in_world("Blair").await;
    let casey = h.in_world("Casey").await;

    ok(h.run(&alex, json!({"type": "group_create", "data": {"name": "Crew"}})).await);
    for (player, name) in [(&blair, "Blair"), (&casey, "Casey")] {
        ok(h
            .run(&alex, json!({"type": "group_invite", "data": {"group": "Crew", "player": name}}))
            .await);
        ok(h.run(player, json!({"type": "group_invite_accept", "data": {"group": "Crew"}})).await);
    }

    let promote = |name: &str| json!({"type": "group_promote", "data": {"group": "Crew", "player": name}});
    ok(h.run(&alex, promote("Blair")).await);
    let admin = ok(h.run(&alex, promote("Blair")).await);
    assert_eq!(admin["role"], "ADMIN");
    let moderator = ok(h.run(&alex, promote("Casey")).await);
    assert_eq!(moderator["role"], "MODERATOR");

    let kick = h
        .run(&casey, json!({"type": "group_kick", "data": {"group": "Crew", "player": "Blair"}}))
        .await;
    assert_eq!(error_kind(&kick), "forbidden");
    let group = h.router.groups().get_group_by_name("crew").await.unwrap().unwrap();
    assert!(group.is_member(blair.id));

    ok(h
        .run(&blair, json!({"type": "group_kick", "data": {"group": "Crew", "player": "Casey"}}))
        .await);
    h.line_for(casey.id, |l| l.text.contains("You were kicked from Crew"))
        .await;
    let group = h.router.groups().get_group(group.id).await.unwrap().unwrap();
    assert!(!group.is_member(casey.id));
}

#[tokio::test]
async fn group_message_reaches_both_channels_with_one_id() {
    let h = Harness::new();
    let alex = h.in_world("Alex").await;
    let casey = h.in_world("Casey").await;
    let (blair, mut web) = h.web_only("Blair").await;

    ok(h.run(&alex, json!({"type": "group_create", "data": {"name": "Squad"}})).await);
    for name in ["Blair", "Casey"] {
        ok(h
            .run(&alex, json!({"type": "group_invite", "data": {"group": "Squad", "player": name}}))
            .await);
    }
    ok(h.run_web(&web, json!({"type": "group_invite_accept", "data": {"group": "Squad"}})).await);
    ok(h.run(&casey, json!({"type": "group_invite_accept", "data": {"group": "Squad"}})).await);
    web.drain();

    let message = ok(h
        .run(&alex, json!({"type": "group_message", "data": {"group": "Squad", "message": "hello"}}))
        .await);
    let id: Uuid = message["messageId"].as_str().unwrap().parse().unwrap();

    let line = h.line_for(casey.id, |l| l.text.ends_with(": hello")).await;
    assert_eq!(line.event_id, id);
    assert_eq!(line.text, "[Group: Squad] Alex: hello");

    let events = web.drain();
    let event = events
        .iter()
        .find(|e| e.event_type == "group_message")
        .expect("web member got the message");
    assert_eq!(event.id, id);
    assert_eq!(event.data["message"]["content"], "hello");

    // Blair is not in the world, so no line was rendered for them.
    assert!(h.roster.lines_for(blair.id).is_empty());

    let history = ok(h
        .run_web(&web, json!({"type": "get_group_messages", "data": {"group": "Squad"}}))
        .await);
    let last = history.as_array().unwrap().last().unwrap().clone();
    assert_eq!(last["messageId"], id.to_string());
}

#[tokio::test]
async fn web_access_off_keeps_web_sessions_out() {
    let h = Harness::new();
    let alex = h.in_world("Alex").await;
    let (_blair, mut web) = h.web_only("Blair").await;

    ok(h.run(&alex, json!({"type": "group_create", "data": {"name": "Quiet"}})).await);
    ok(h
        .run(&alex, json!({"type": "group_invite", "data": {"group": "Quiet", "player": "Blair"}}))
        .await);
    ok(h.run_web(&web, json!({"type": "group_invite_accept", "data": {"group": "Quiet"}})).await);
    ok(h
        .run(&alex, json!({
            "type": "group_settings",
            "data": {"group": "Quiet", "settings": {"web_access_enabled": false}},
        }))
        .await);
    web.drain();

    ok(h
        .run(&alex, json!({"type": "group_message", "data": {"group": "Quiet", "message": "psst"}}))
        .await);
    assert!(web.drain().is_empty());

    let posted = h
        .run_web(&web, json!({"type": "group_message", "data": {"group": "Quiet", "message": "hi"}}))
        .await;
    assert_eq!(error_kind(&posted), "forbidden");
}

#[tokio::test]
async fn muted_member_cannot_post_until_unmuted() {
    let h = Harness::new();
    let alex = h.in_world("Alex").await;
    let blair = h.in_world("Blair").await;

    ok(h.run(&alex, json!({"type": "group_create", "data": {"name": "Loud"}})).await);
    ok(h
        .run(&alex, json!({"type": "group_invite", "data": {"group": "Loud", "player": "Blair"}}))
        .await);
    ok(h.run(&blair, json!({"type": "group_invite_accept", "data": {"group": "Loud"}})).await);

    let muted = ok(h
        .run(&alex, json!({"type": "group_mute", "data": {"group": "Loud", "player": "Blair"}}))
        .await);
    assert_eq!(muted["muted"], true);

    let post = json!({"type": "group_message", "data": {"group": "Loud", "message": "hey"}});
    let reply = h.run(&blair, post.clone()).await;
    assert_eq!(reply["error"]["code"], "MUTED");

    ok(h
        .run(&alex, json!({"type": "group_unmute", "data": {"group": "Loud", "player": "Blair"}}))
        .await);
    ok(h.run(&blair, post).await);
}

#[tokio::test]
async fn private_message_needs_a_reachable_friend() {
    let h = Harness::new();
    let alex = h.in_world("Alex").await;
    let blair = h.in_world("Blair").await;

    let msg = json!({"type": "friend_message", "data": {"player": "Blair", "message": "yo"}});
    let reply = h.run(&alex, msg.clone()).await;
    assert_eq!(error_kind(&reply), "forbidden");

    ok(h.run(&alex, json!({"type": "friend_request", "data": {"player": "Blair"}})).await);
    ok(h.run(&blair, json!({"type": "friend_accept", "data": {"player": "Alex"}})).await);

    ok(h.run(&alex, msg.clone()).await);
    h.line_for(blair.id, |l| l.text == "[PM] Alex -> Blair: yo").await;

    h.roster.leave(blair.id);
    let reply = h.run(&alex, msg).await;
    assert_eq!(error_kind(&reply), "not_found");
}
