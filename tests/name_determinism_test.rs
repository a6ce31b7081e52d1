//! Derived names are a pure function of (project, services, tld).

use berth::identity::{derive, ServiceSpec};

fn spec(name: &str, ports: &[u16]) -> ServiceSpec {
    ServiceSpec::new(name, ports.to_vec())
}

#[test]
fn shop_with_web_and_worker() {
    let services = vec![spec("web", &[80]), spec("worker", &[])];
    let identity = derive("shop", &services, "local");

    assert_eq!(identity.primary_domain, "shop.local");
    assert_eq!(identity.main_service.as_deref(), Some("web"));
    assert_eq!(
        identity.service_domains.get("web").map(String::as_str),
        Some("shop.local"),
        "main service answers on the bare project domain"
    );
    assert!(
        !identity.service_domains.contains_key("worker"),
        "worker is not web-facing and receives no DNS name"
    );
}

#[test]
fn derivation_is_stable_across_calls_and_orderings() {
    let a = vec![spec("web", &[80]), spec("api", &[8080]), spec("db", &[5432])];
    let b = vec![spec("db", &[5432]), spec("api", &[8080]), spec("web", &[80])];

    let identity_a = derive("shop", &a, "test");
    let identity_b = derive("shop", &b, "test");

    assert_eq!(identity_a, identity_b, "declaration order must not matter");
    assert_eq!(identity_a, derive("shop", &a, "test"));
}

#[test]
fn distinct_projects_never_collide() {
    let services = vec![spec("web", &[80]), spec("api", &[8080])];
    let one = derive("one", &services, "test");
    let two = derive("two", &services, "test");

    for domain in one.domains() {
        assert!(
            !two.domains().contains(&domain),
            "domain {} derived for both projects",
            domain
        );
    }
}

#[test]
fn subdomains_nest_under_the_project() {
    let services = vec![spec("web", &[80]), spec("api", &[8080]), spec("ui", &[3000])];
    let identity = derive("shop", &services, "test");

    for (service, domain) in &identity.service_domains {
        if Some(service.as_str()) == identity.main_service.as_deref() {
            assert_eq!(domain, "shop.test");
        } else {
            assert_eq!(domain, &format!("{}.shop.test", service));
        }
    }
}
