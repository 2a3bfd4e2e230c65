// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod nginx_controller;
pub mod pod_healer;
