// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod healer;
pub mod health;
pub mod remediation;
