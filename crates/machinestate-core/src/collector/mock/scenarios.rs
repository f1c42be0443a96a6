//! Pre-built mock machines for testing.
//!
//! These scenarios provide realistic `/proc`, `/sys` and tool output for a
//! small compute node, so every information class has something to read.

use super::host::MockHost;

/// Per-CPU `(core_id, thread_siblings_list)` of the typical machine.
const CPUS: [(u32, &str); 4] = [(0, "0,2"), (1, "1,3"), (0, "0,2"), (1, "1,3")];

/// `(index, level, type, size, shared with siblings)` of each cache.
const CACHES: [(u32, u32, &str, &str, bool); 4] = [
    (0, 1, "Data", "32K", true),
    (1, 1, "Instruction", "32K", true),
    (2, 2, "Unified", "1024K", true),
    (3, 3, "Unified", "8192K", false),
];

impl MockHost {
    /// Creates a single-socket node with 2 cores × 2 threads and one NUMA node.
    ///
    /// Includes: hostname, os-release, x86 cpuinfo, per-CPU topology,
    /// cpufreq and caches, NUMA with huge pages, RAPL, DMI, gcc/g++,
    /// python3, Open MPI and a login shell environment.
    pub fn typical_machine() -> Self {
        let mut host = Self::new();

        host.add_command("hostname", &["-s"], "node01\n");
        host.add_command("hostname", &["-d"], "cluster.example.org\n");
        host.add_command("hostname", &["-f"], "node01.cluster.example.org\n");

        host.add_file(
            "/etc/os-release",
            "\
PRETTY_NAME=\"Ubuntu 22.04.4 LTS\"
NAME=\"Ubuntu\"
VERSION_ID=\"22.04\"
VERSION=\"22.04.4 LTS (Jammy Jellyfish)\"
VERSION_CODENAME=jammy
ID=ubuntu
ID_LIKE=debian
HOME_URL=\"https://www.ubuntu.com/\"
",
        );

        // /proc
        host.add_file("/proc/uptime", "86400.25 331200.80\n");
        host.add_file("/proc/loadavg", "0.52 0.41 0.31 2/612 48231\n");
        host.add_file(
            "/proc/cmdline",
            "BOOT_IMAGE=/vmlinuz-5.15.0-105-generic root=/dev/sda2 ro quiet splash\n",
        );
        host.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16303428 kB
MemFree:         6571236 kB
MemAvailable:   12744920 kB
Buffers:          388104 kB
Cached:          6148096 kB
SwapCached:         1024 kB
Active:          5244136 kB
Inactive:        3650228 kB
SwapTotal:       2097148 kB
SwapFree:        2097148 kB
Dirty:               212 kB
Writeback:             0 kB
",
        );
        let mut cpuinfo = String::new();
        for (n, (core, _)) in CPUS.iter().enumerate() {
            cpuinfo.push_str(&format!(
                "\
processor\t: {n}
vendor_id\t: GenuineIntel
cpu family\t: 6
model\t\t: 85
model name\t: Intel(R) Xeon(R) Gold 6148 CPU @ 2.40GHz
stepping\t: 4
microcode\t: 0x2007006
cpu MHz\t\t: 2400.000
cache size\t: 8192 KB
physical id\t: 0
siblings\t: 4
core id\t\t: {core}
cpu cores\t: 2
flags\t\t: fpu vme de pse tsc msr pae mce cx8 apic sep mtrr sse sse2 ht syscall nx lm avx avx2 avx512f avx512dq
bugs\t\t: spectre_v1 spectre_v2 spec_store_bypass mds
bogomips\t: 4800.00

"
            ));
        }
        host.add_file("/proc/cpuinfo", cpuinfo);
        host.add_file("/proc/1/cgroup", "0::/init.scope\n");

        host.add_file("/proc/sys/kernel/osrelease", "5.15.0-105-generic\n");
        host.add_file("/proc/sys/kernel/watchdog", "1\n");
        host.add_file("/proc/sys/kernel/randomize_va_space", "2\n");
        host.add_file("/proc/sys/kernel/numa_balancing", "1\n");
        host.add_file("/proc/sys/kernel/numa_balancing_scan_delay_ms", "1000\n");
        host.add_file("/proc/sys/kernel/numa_balancing_scan_period_max_ms", "60000\n");
        host.add_file("/proc/sys/kernel/numa_balancing_scan_period_min_ms", "1000\n");
        host.add_file("/proc/sys/kernel/numa_balancing_scan_size_mb", "256\n");

        // CPUs, caches, frequencies
        let cpu_dir = "/sys/devices/system/cpu";
        host.add_file(format!("{cpu_dir}/online"), "0-3\n");
        for (n, (core, siblings)) in CPUS.iter().enumerate() {
            let cpu = format!("{cpu_dir}/cpu{n}");
            host.add_file(format!("{cpu}/topology/core_id"), format!("{core}\n"));
            host.add_file(format!("{cpu}/topology/physical_package_id"), "0\n");
            host.add_file(format!("{cpu}/topology/thread_siblings_list"), format!("{siblings}\n"));

            host.add_file(format!("{cpu}/cpufreq/scaling_max_freq"), "3700000\n");
            host.add_file(format!("{cpu}/cpufreq/scaling_min_freq"), "1000000\n");
            host.add_file(format!("{cpu}/cpufreq/scaling_governor"), "performance\n");
            host.add_file(format!("{cpu}/cpufreq/scaling_driver"), "intel_pstate\n");
            host.add_file(format!("{cpu}/cpufreq/base_frequency"), "2400000\n");

            for (index, level, kind, size, per_core) in CACHES {
                let cache = format!("{cpu}/cache/index{index}");
                let shared = if per_core { *siblings } else { "0-3" };
                host.add_file(format!("{cache}/level"), format!("{level}\n"));
                host.add_file(format!("{cache}/type"), format!("{kind}\n"));
                host.add_file(format!("{cache}/size"), format!("{size}\n"));
                host.add_file(format!("{cache}/shared_cpu_list"), format!("{shared}\n"));
                host.add_file(format!("{cache}/coherency_line_size"), "64\n");
                host.add_file(format!("{cache}/physical_line_partition"), "1\n");
                host.add_file(format!("{cache}/ways_of_associativity"), "8\n");
                host.add_file(format!("{cache}/number_of_sets"), "64\n");
            }
        }
        host.add_dir(format!("{cpu_dir}/cpuidle"));

        // NUMA
        let node = "/sys/devices/system/node/node0";
        host.add_file(
            format!("{node}/meminfo"),
            "\
Node 0 MemTotal:       16303428 kB
Node 0 MemFree:         6571236 kB
Node 0 MemUsed:         9732192 kB
Node 0 Writeback:             0 kB
",
        );
        host.add_file(format!("{node}/distance"), "10\n");
        host.add_file(format!("{node}/cpulist"), "0-3\n");
        host.add_file(format!("{node}/hugepages/hugepages-2048kB/nr_hugepages"), "16\n");
        host.add_file(format!("{node}/hugepages/hugepages-2048kB/free_hugepages"), "12\n");

        // Memory management
        let mm = "/sys/kernel/mm";
        host.add_file(format!("{mm}/hugepages/hugepages-2048kB/nr_hugepages"), "16\n");
        host.add_file(format!("{mm}/hugepages/hugepages-2048kB/free_hugepages"), "12\n");
        host.add_file(format!("{mm}/hugepages/hugepages-2048kB/resv_hugepages"), "0\n");
        host.add_file(
            format!("{mm}/transparent_hugepage/enabled"),
            "always [madvise] never\n",
        );
        host.add_file(
            format!("{mm}/transparent_hugepage/defrag"),
            "always defer defer+madvise [madvise] never\n",
        );
        host.add_file(format!("{mm}/transparent_hugepage/use_zero_page"), "1\n");

        host.add_file("/sys/bus/workqueue/devices/writeback/cpumask", "f\n");
        host.add_file("/sys/bus/workqueue/devices/writeback/max_active", "256\n");
        host.add_file("/sys/fs/cgroup/cpuset.cpus.effective", "0-3\n");
        host.add_file("/sys/fs/cgroup/cpuset.mems.effective", "0\n");

        let clocksource = "/sys/devices/system/clocksource/clocksource0";
        host.add_file(format!("{clocksource}/current_clocksource"), "tsc\n");
        host.add_file(format!("{clocksource}/available_clocksource"), "tsc hpet acpi_pm \n");

        // RAPL
        let rapl = "/sys/devices/virtual/powercap/intel-rapl/intel-rapl:0";
        host.add_file(format!("{rapl}/name"), "package-0\n");
        host.add_file(format!("{rapl}/enabled"), "1\n");
        host.add_file(format!("{rapl}/constraint_0_name"), "long_term\n");
        host.add_file(format!("{rapl}/constraint_0_power_limit_uw"), "150000000\n");
        host.add_file(format!("{rapl}/intel-rapl:0:0/name"), "core\n");
        host.add_file(format!("{rapl}/intel-rapl:0:0/enabled"), "0\n");
        host.add_file(format!("{rapl}/intel-rapl:0:0/constraint_0_name"), "long_term\n");
        host.add_file(format!("{rapl}/intel-rapl:0:0/constraint_0_power_limit_uw"), "0\n");
        host.add_file(format!("{rapl}/intel-rapl:0:0/constraint_0_time_window_us"), "976\n");

        // DMI
        let dmi = "/sys/class/dmi/id";
        host.add_file(format!("{dmi}/bios_vendor"), "American Megatrends Inc.\n");
        host.add_file(format!("{dmi}/bios_version"), "3.4\n");
        host.add_file(format!("{dmi}/bios_date"), "11/05/2021\n");
        host.add_file(format!("{dmi}/sys_vendor"), "Supermicro\n");
        host.add_file(format!("{dmi}/product_name"), "SYS-1029U-TRT\n");
        host.add_file(format!("{dmi}/board_vendor"), "Supermicro\n");
        host.add_file(format!("{dmi}/product_serial"), "S123456X9A01234\n");
        host.add_file(format!("{dmi}/product_uuid"), "00000000-0000-0000-0000-ac1f6b4c2d3e\n");

        // Tools
        host.add_command(
            "gcc",
            &["--version"],
            "gcc (Ubuntu 11.4.0-1ubuntu1~22.04) 11.4.0\n\
             Copyright (C) 2021 Free Software Foundation, Inc.\n",
        );
        host.add_command(
            "g++",
            &["--version"],
            "g++ (Ubuntu 11.4.0-1ubuntu1~22.04) 11.4.0\n\
             Copyright (C) 2021 Free Software Foundation, Inc.\n",
        );
        host.add_command("python3", &["--version"], "Python 3.10.12\n");
        host.add_command(
            "mpirun",
            &["--version"],
            "mpirun (Open MPI) 4.1.2\n\nReport bugs to http://www.open-mpi.org/community/help/\n",
        );

        // Environment
        host.set_env("PATH", "/usr/local/bin:/usr/bin:/bin");
        host.set_env("HOME", "/home/alice");
        host.set_env("USER", "alice");
        host.set_env("LOGNAME", "alice");
        host.set_env("SHELL", "/bin/bash");
        host.set_env("LANG", "C.UTF-8");
        host.set_env("PWD", "/home/alice/bench");
        host.set_env("SHLVL", "1");
        host.set_env("OMP_NUM_THREADS", "4");
        host.set_env("SSH_CONNECTION", "10.0.0.1 52344 10.0.0.21 22");

        host
    }
}
