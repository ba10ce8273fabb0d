//! Tests for host allow-lists.

use std::net::IpAddr;

use super::*;

fn list(value: &str) -> HostMatchList {
    HostMatchList::parse("test.allowed", value).unwrap()
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

mod builtins {
    use super::*;

    #[test]
    fn empty_spec_means_external() {
        let hl = list("");

        assert!(hl.match_ip(ip("8.8.8.8")));
        assert!(!hl.match_ip(ip("127.0.0.1")));
        assert!(!hl.match_ip(ip("192.168.1.10")));
    }

    #[test]
    fn external_excludes_private_loopback_and_link_local() {
        let hl = list("external");

        assert!(hl.match_ip(ip("1.1.1.1")));
        assert!(hl.match_ip(ip("2001:4860:4860::8888")));
        assert!(!hl.match_ip(ip("10.0.0.1")));
        assert!(!hl.match_ip(ip("169.254.1.1")));
        assert!(!hl.match_ip(ip("::1")));
        assert!(!hl.match_ip(ip("fd00::1")));
        assert!(!hl.match_ip(ip("fe80::1")));
        assert!(!hl.match_ip(ip("0.0.0.0")));
    }

    #[test]
    fn private_matches_rfc1918_and_unique_local() {
        let hl = list("private");

        assert!(hl.match_ip(ip("10.1.2.3")));
        assert!(hl.match_ip(ip("172.16.0.1")));
        assert!(hl.match_ip(ip("192.168.0.1")));
        assert!(hl.match_ip(ip("fc00::1")));
        assert!(!hl.match_ip(ip("8.8.8.8")));
        assert!(!hl.match_ip(ip("127.0.0.1")));
    }

    #[test]
    fn loopback_matches_both_families() {
        let hl = list("loopback");

        assert!(hl.match_ip(ip("127.0.0.1")));
        assert!(hl.match_ip(ip("::1")));
        assert!(!hl.match_ip(ip("10.0.0.1")));
    }

    #[test]
    fn mapped_ipv4_is_classified_as_ipv4() {
        assert!(list("loopback").match_ip(ip("::ffff:127.0.0.1")));
        assert!(!list("external").match_ip(ip("::ffff:10.0.0.1")));
    }

    #[test]
    fn star_matches_everything() {
        let hl = list("*");

        assert!(hl.match_ip(ip("127.0.0.1")));
        assert!(hl.match_host_name("anything.internal"));
    }
}

mod networks {
    use super::*;

    #[test]
    fn cidr_blocks_match_contained_addresses() {
        let hl = list("10.0.0.0/8, 2001:db8::/32");

        assert!(hl.match_ip(ip("10.200.0.1")));
        assert!(hl.match_ip(ip("2001:db8::5")));
        assert!(!hl.match_ip(ip("11.0.0.1")));
    }

    #[test]
    fn literal_ip_host_falls_back_to_address_rules() {
        let hl = list("192.168.0.0/16");

        assert!(hl.match_host_name("192.168.3.4"));
        assert!(hl.match_host_name("192.168.3.4:8080"));
        assert!(hl.match_host_name("[::ffff:192.168.3.4]:443"));
        assert!(!hl.match_host_name("10.0.0.1"));
    }
}

mod patterns {
    use super::*;

    #[test]
    fn globs_match_host_names() {
        let hl = list("*.ci.example.com, build.example.org");

        assert!(hl.match_host_name("runner.ci.example.com"));
        assert!(hl.match_host_name("a.b.ci.example.com"));
        assert!(hl.match_host_name("BUILD.example.org"));
        assert!(!hl.match_host_name("ci.example.com"));
        assert!(!hl.match_host_name("example.org"));
    }

    #[test]
    fn port_is_stripped_before_matching() {
        assert!(list("git.example.com").match_host_name("git.example.com:3000"));
    }

    #[test]
    fn match_pattern_ignores_address_rules() {
        let hl = list("external, *.example.com");

        assert!(hl.match_pattern("www.example.com"));
        assert!(!hl.match_pattern("8.8.8.8"));
    }

    #[test]
    fn question_mark_matches_one_character() {
        let hl = list("node?.example.com");

        assert!(hl.match_host_name("node1.example.com"));
        assert!(!hl.match_host_name("node12.example.com"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let hl = list("a+b.example.com");

        assert!(hl.match_host_name("a+b.example.com"));
        assert!(!hl.match_host_name("aab.example.com"));
    }
}

mod glob {
    use super::*;

    #[test]
    fn braces_are_alternatives() {
        let re = glob_to_regex("{api,www}.example.com").unwrap();

        assert!(re.is_match("api.example.com"));
        assert!(re.is_match("www.example.com"));
        assert!(!re.is_match("ftp.example.com"));
    }

    #[test]
    fn unclosed_brace_is_an_error() {
        assert!(glob_to_regex("{api.example.com").is_err());
    }

    #[test]
    fn setting_key_is_kept() {
        assert_eq!(list("").setting_key(), "test.allowed");
    }
}
