pub mod floating_ips;
